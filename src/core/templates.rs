//! Emission templates and spectral-grid helpers for nightside fitting.
//!
//! Templates are tabulated on the 1024 detector pixels and summed into the
//! spectral bin width of an observation before fitting. Transmitted spectra,
//! which usually cover only part of the detector, are padded with NaN so they
//! line up with the full rebinned grid.

use crate::types::{IuvsError, IuvsResult};
use ndarray::{s, Array1, Array3, ArrayView1, ArrayView3};

pub const NO_NIGHTGLOW: &str = "no_nightglow";
pub const CO_CAMERON_BANDS: &str = "co_cameron_bands";
pub const CO2P_UVD: &str = "co2p_uvd";
pub const O2972: &str = "o2972";
pub const CO2P_FDB: &str = "co2p_fdb";
pub const COP_1NG: &str = "cop_1ng";
pub const N2_VK: &str = "n2_vk";
pub const SOLAR_CONTINUUM: &str = "solar_continuum";

/// Templates whose brightnesses add up to the aurora
pub const AURORAL_TEMPLATES: [&str; 4] = [CO_CAMERON_BANDS, CO2P_UVD, O2972, CO2P_FDB];

/// Templates fitted to nightside MUV spectra by default
pub const STANDARD_FIT_TEMPLATES: [&str; 4] = [NO_NIGHTGLOW, CO_CAMERON_BANDS, CO2P_UVD, SOLAR_CONTINUUM];

/// Ordered collection of named basis spectra sharing one spectral grid
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateLibrary {
    templates: Vec<(String, Array1<f64>)>,
}

impl TemplateLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a template. Every template must have the same length and a
    /// distinct name.
    pub fn insert(&mut self, name: impl Into<String>, spectrum: Array1<f64>) -> IuvsResult<()> {
        let name = name.into();
        if self.get(&name).is_some() {
            return Err(IuvsError::InvalidFormat(format!("Duplicate template '{}'", name)));
        }
        if let Some(len) = self.spectral_len() {
            if spectrum.len() != len {
                return Err(IuvsError::ShapeMismatch(format!(
                    "Template '{}' has {} samples, library has {}",
                    name,
                    spectrum.len(),
                    len
                )));
            }
        }
        self.templates.push((name, spectrum));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Array1<f64>> {
        self.templates.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    pub fn names(&self) -> Vec<&str> {
        self.templates.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Array1<f64>)> {
        self.templates.iter().map(|(n, t)| (n.as_str(), t))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Number of spectral samples per template, `None` for an empty library
    pub fn spectral_len(&self) -> Option<usize> {
        self.templates.first().map(|(_, t)| t.len())
    }

    /// Sub-library with the named templates, in the order given
    pub fn select(&self, names: &[&str]) -> IuvsResult<TemplateLibrary> {
        let mut selected = TemplateLibrary::new();
        for &name in names {
            let template = self
                .get(name)
                .ok_or_else(|| IuvsError::Config(format!("Template '{}' is not in the library", name)))?;
            selected.insert(name, template.clone())?;
        }
        Ok(selected)
    }

    /// Every template summed into groups of `spectral_bin_width` pixels
    pub fn rebin(&self, spectral_bin_width: usize) -> IuvsResult<TemplateLibrary> {
        let mut rebinned = TemplateLibrary::new();
        for (name, template) in self.iter() {
            rebinned.insert(name, rebin_template(template.view(), spectral_bin_width)?)?;
        }
        log::debug!(
            "Rebinned {} templates to width {} ({} bins)",
            rebinned.len(),
            spectral_bin_width,
            rebinned.spectral_len().unwrap_or(0)
        );
        Ok(rebinned)
    }
}

fn check_group_width(len: usize, width: usize) -> IuvsResult<()> {
    if width == 0 || len % width != 0 {
        return Err(IuvsError::InvalidBinning(format!(
            "{} samples cannot be split into groups of {}",
            len, width
        )));
    }
    Ok(())
}

/// Sum consecutive groups of `spectral_bin_width` samples
pub fn rebin_template(template: ArrayView1<f64>, spectral_bin_width: usize) -> IuvsResult<Array1<f64>> {
    check_group_width(template.len(), spectral_bin_width)?;
    Ok(template
        .exact_chunks(spectral_bin_width)
        .into_iter()
        .map(|group| group.sum())
        .collect())
}

/// Average consecutive groups of `spectral_bin_width` wavelengths
pub fn rebin_wavelengths(wavelengths: ArrayView1<f64>, spectral_bin_width: usize) -> IuvsResult<Array1<f64>> {
    check_group_width(wavelengths.len(), spectral_bin_width)?;
    Ok(wavelengths
        .exact_chunks(spectral_bin_width)
        .into_iter()
        .map(|group| group.sum() / spectral_bin_width as f64)
        .collect())
}

fn check_padding(n_transmitted: usize, n_full: usize, start: usize) -> IuvsResult<()> {
    if start + n_transmitted > n_full {
        return Err(IuvsError::InvalidBinning(format!(
            "{} bins starting at {} do not fit in a grid of {}",
            n_transmitted, start, n_full
        )));
    }
    Ok(())
}

/// Place `spectrum` at `start` inside a NaN-filled grid of `n_full` bins
pub fn pad_spectrum_with_nan(spectrum: ArrayView1<f64>, n_full: usize, start: usize) -> IuvsResult<Array1<f64>> {
    check_padding(spectrum.len(), n_full, start)?;
    let mut padded = Array1::from_elem(n_full, f64::NAN);
    padded.slice_mut(s![start..start + spectrum.len()]).assign(&spectrum);
    Ok(padded)
}

/// [`pad_spectrum_with_nan`] along the last axis of an
/// (integration, spatial, spectral) cube
pub fn pad_spectral_axis_with_nan(cube: ArrayView3<f64>, n_full: usize, start: usize) -> IuvsResult<Array3<f64>> {
    let (n_int, n_spa, n_spe) = cube.dim();
    check_padding(n_spe, n_full, start)?;
    let mut padded = Array3::from_elem((n_int, n_spa, n_full), f64::NAN);
    padded.slice_mut(s![.., .., start..start + n_spe]).assign(&cube);
    Ok(padded)
}
