//! Solar irradiance model used as the denominator of reflectance.
//!
//! The reference spectrum is converted once to photon units, integrated over
//! each detector pixel, blurred by the instrument point-spread function and
//! summed into the spectral bins of an observation.

use crate::constants::watts_to_kilorayleigh_factor;
use crate::core::binning::BinningScheme;
use crate::core::numeric::{adaptive_simpson, convolve_same, interp, linear_fit};
use crate::types::{IuvsError, IuvsResult, PointSpreadFunction, SolarReferenceSpectrum};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Quadrature settings of the solar flux integration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolarFluxOptions {
    #[serde(rename = "absoluteTolerance")]
    pub absolute_tolerance: f64,
    /// Tolerance relative to a trapezoid estimate of each pixel integral
    #[serde(rename = "relativeTolerance")]
    pub relative_tolerance: f64,
    #[serde(rename = "maxDepth")]
    pub max_depth: u32,
}

impl Default for SolarFluxOptions {
    fn default() -> Self {
        Self {
            absolute_tolerance: 1.49e-8,
            relative_tolerance: 1.49e-8,
            max_depth: 30,
        }
    }
}

/// Solar photon flux at 1 AU [kR/nm] as a function of wavelength
#[derive(Debug, Clone)]
pub struct SolarFluxModel {
    wavelengths: Vec<f64>,
    photon_flux: Vec<f64>,
    options: SolarFluxOptions,
}

impl SolarFluxModel {
    pub fn new(spectrum: &SolarReferenceSpectrum) -> Self {
        Self::with_options(spectrum, SolarFluxOptions::default())
    }

    pub fn with_options(spectrum: &SolarReferenceSpectrum, options: SolarFluxOptions) -> Self {
        let wavelengths = spectrum.wavelengths().to_vec();
        let photon_flux = wavelengths
            .iter()
            .zip(spectrum.irradiance())
            .map(|(&w, &f)| f * watts_to_kilorayleigh_factor(w))
            .collect();

        log::debug!(
            "Solar flux model over {:.2}-{:.2} nm from {} samples",
            wavelengths.first().copied().unwrap_or(f64::NAN),
            wavelengths.last().copied().unwrap_or(f64::NAN),
            wavelengths.len()
        );

        Self {
            wavelengths,
            photon_flux,
            options,
        }
    }

    /// Photon flux [kR/nm] at `wavelength` [nm]; edge values outside the
    /// tabulated range
    pub fn irradiance_at(&self, wavelength: f64) -> f64 {
        interp(wavelength, &self.wavelengths, &self.photon_flux)
    }

    /// Photon flux [kR] integrated over `[low, high]` nm
    pub fn integrate(&self, low: f64, high: f64) -> f64 {
        let coarse = 0.5 * (high - low) * (self.irradiance_at(low) + self.irradiance_at(high));
        let tolerance = self
            .options
            .absolute_tolerance
            .max(self.options.relative_tolerance * coarse.abs());

        let estimate = adaptive_simpson(
            |w| self.irradiance_at(w),
            low,
            high,
            tolerance,
            self.options.max_depth,
        );
        if !estimate.converged {
            log::trace!(
                "Solar integral over {:.4}-{:.4} nm did not converge (error {:.3e})",
                low,
                high,
                estimate.error
            );
        }
        estimate.value
    }

    /// Integrated flux of every interval between consecutive `edges`
    pub fn integrate_pixels(&self, edges: &[f64]) -> Vec<f64> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            edges.par_windows(2).map(|w| self.integrate(w[0], w[1])).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            edges.windows(2).map(|w| self.integrate(w[0], w[1])).collect()
        }
    }

    /// Solar flux [kR] received by each spectral bin of `binning` at
    /// `mars_sun_distance_au`.
    ///
    /// `pixel_edges` holds the wavelength [nm] of every detector pixel
    /// boundary, one more value than there are pixels.
    pub fn rebin_to_instrument(
        &self,
        pixel_edges: &[f64],
        psf: &PointSpreadFunction,
        binning: &BinningScheme,
        mars_sun_distance_au: f64,
    ) -> IuvsResult<Array1<f64>> {
        if pixel_edges.len() < 2 {
            return Err(IuvsError::ShapeMismatch(
                "At least two pixel edges are needed to rebin the solar flux".to_string(),
            ));
        }
        if !(mars_sun_distance_au.is_finite() && mars_sun_distance_au > 0.0) {
            return Err(IuvsError::Processing(format!(
                "Mars-Sun distance must be positive, got {}",
                mars_sun_distance_au
            )));
        }

        let n_pixels = pixel_edges.len() - 1;
        let last_pixel = binning.spectral_bin_high().iter().copied().max().unwrap_or(0);
        if last_pixel >= n_pixels {
            return Err(IuvsError::ShapeMismatch(format!(
                "Binning reaches pixel {} but only {} pixel edges were given",
                last_pixel,
                pixel_edges.len()
            )));
        }
        if psf.len() > n_pixels {
            return Err(IuvsError::ShapeMismatch(format!(
                "Point spread function ({} weights) is longer than the pixel grid ({})",
                psf.len(),
                n_pixels
            )));
        }

        log::info!(
            "Rebinning solar flux onto {} spectral bins at {:.4} AU",
            binning.n_spectral_bins(),
            mars_sun_distance_au
        );

        let scale = 1.0 / (mars_sun_distance_au * mars_sun_distance_au);
        let pixel_flux: Vec<f64> = self
            .integrate_pixels(pixel_edges)
            .into_iter()
            .map(|flux| flux * scale)
            .collect();
        let convolved = convolve_same(&pixel_flux, psf.weights());

        Ok(binning
            .spectral_bin_low()
            .iter()
            .zip(binning.spectral_bin_high())
            .map(|(&low, &high)| convolved[low..=high].iter().sum())
            .collect())
    }
}

/// Wavelength [nm] of every detector pixel boundary along the spectral axis.
///
/// A straight line is fitted through the bin-centre wavelengths. With a single
/// bin the slope is taken from the wavelength width of a bin.
pub fn pixel_wavelength_edges(
    binning: &BinningScheme,
    wavelength_centers: &[f64],
    wavelength_width: f64,
) -> IuvsResult<Vec<f64>> {
    if wavelength_centers.len() != binning.n_spectral_bins() {
        return Err(IuvsError::ShapeMismatch(format!(
            "{} wavelength centers for {} spectral bins",
            wavelength_centers.len(),
            binning.n_spectral_bins()
        )));
    }

    let centers = binning.spectral_bin_centers();
    let (slope, intercept) = match linear_fit(&centers, wavelength_centers) {
        Some(line) => line,
        None => {
            let slope = wavelength_width / binning.spectral_bin_width() as f64;
            if !slope.is_finite() || !wavelength_centers[0].is_finite() {
                return Err(IuvsError::InvalidFormat(
                    "Cannot derive a wavelength scale for the detector".to_string(),
                ));
            }
            (slope, wavelength_centers[0] - slope * centers[0])
        }
    };
    log::debug!(
        "Detector dispersion {:.5} nm/pixel, zero point {:.3} nm",
        slope,
        intercept
    );

    Ok((0..=binning.detector_pixels())
        .map(|pixel| slope * pixel as f64 + intercept)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn flat_spectrum(irradiance: f64) -> SolarReferenceSpectrum {
        SolarReferenceSpectrum::new(vec![100.0, 200.0, 300.0, 400.0], vec![irradiance; 4]).unwrap()
    }

    #[test]
    fn test_flux_is_converted_to_photon_units() {
        let model = SolarFluxModel::new(&flat_spectrum(2.0));
        assert_relative_eq!(
            model.irradiance_at(250.0),
            2.0 * watts_to_kilorayleigh_factor(250.0),
            max_relative = 1e-12
        );
        // Clamped outside the table
        assert_relative_eq!(model.irradiance_at(50.0), model.irradiance_at(100.0));
    }

    #[test]
    fn test_integral_of_linear_flux_is_exact() {
        let spectrum = SolarReferenceSpectrum::new(vec![100.0, 300.0], vec![1.0, 1.0]).unwrap();
        let model = SolarFluxModel::new(&spectrum);
        // Photon flux grows linearly with wavelength for constant irradiance
        let expected = watts_to_kilorayleigh_factor(1.0) * (250.0_f64.powi(2) - 150.0_f64.powi(2)) / 2.0;
        assert_relative_eq!(model.integrate(150.0, 250.0), expected, max_relative = 1e-10);
    }

    #[test]
    fn test_delta_psf_conserves_flux() {
        let model = SolarFluxModel::new(&flat_spectrum(1.0));
        let binning = BinningScheme::with_detector_size(vec![0], vec![0], vec![0, 4], vec![3, 7], 8).unwrap();
        let edges: Vec<f64> = (0..=8).map(|p| 200.0 + 0.5 * p as f64).collect();

        let rebinned = model
            .rebin_to_instrument(&edges, &PointSpreadFunction::delta(), &binning, 1.0)
            .unwrap();
        let total: f64 = rebinned.sum();
        assert_relative_eq!(total, model.integrate(200.0, 204.0), max_relative = 1e-10);
    }

    #[test]
    fn test_inverse_square_scaling() {
        let model = SolarFluxModel::new(&flat_spectrum(1.0));
        let binning = BinningScheme::with_detector_size(vec![0], vec![0], vec![2], vec![5], 8).unwrap();
        let edges: Vec<f64> = (0..=8).map(|p| 200.0 + p as f64).collect();
        let psf = PointSpreadFunction::new(vec![1.0, 2.0, 1.0]).unwrap();

        let near = model.rebin_to_instrument(&edges, &psf, &binning, 1.0).unwrap();
        let far = model.rebin_to_instrument(&edges, &psf, &binning, 2.0).unwrap();
        assert_relative_eq!(near[0], 4.0 * far[0], max_relative = 1e-12);
    }

    #[test]
    fn test_rebin_rejects_bad_inputs() {
        let model = SolarFluxModel::new(&flat_spectrum(1.0));
        let binning = BinningScheme::with_detector_size(vec![0], vec![0], vec![0], vec![7], 8).unwrap();
        let edges: Vec<f64> = (0..=4).map(|p| 200.0 + p as f64).collect();
        let psf = PointSpreadFunction::delta();

        assert!(model.rebin_to_instrument(&edges, &psf, &binning, 1.0).is_err());
        assert!(model.rebin_to_instrument(&[200.0], &psf, &binning, 1.0).is_err());
        let full: Vec<f64> = (0..=8).map(|p| 200.0 + p as f64).collect();
        assert!(model.rebin_to_instrument(&full, &psf, &binning, 0.0).is_err());
    }

    #[test]
    fn test_pixel_wavelength_edges_follow_bin_centres() {
        let binning = BinningScheme::with_detector_size(vec![0], vec![0], vec![0, 2, 4], vec![1, 3, 5], 6).unwrap();
        // Bin centres at pixels 1, 3, 5 → 0.5 nm per pixel starting at 100 nm
        let edges = pixel_wavelength_edges(&binning, &[100.5, 101.5, 102.5], 1.0).unwrap();
        assert_eq!(edges.len(), 7);
        assert_relative_eq!(edges[0], 100.0, epsilon = 1e-12);
        assert_relative_eq!(edges[6], 103.0, epsilon = 1e-12);

        let single = BinningScheme::with_detector_size(vec![0], vec![0], vec![2], vec![3], 6).unwrap();
        let edges = pixel_wavelength_edges(&single, &[101.5], 1.0).unwrap();
        assert_relative_eq!(edges[0], 100.0, epsilon = 1e-12);
    }
}
