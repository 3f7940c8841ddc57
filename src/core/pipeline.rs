//! Per-file processing chains for dayside and nightside observations.
//!
//! A processor is built once from the pipeline configuration and the
//! ancillary data, then applied to any number of observations. All per-file
//! state (calibration curve, rebinned flux, padded cubes) lives inside the
//! `process` call.

use crate::config::PipelineConfig;
use crate::core::calibration_curve::{CalibrationCurve, CalibrationCurveBuilder};
use crate::core::flatfield::Flatfield;
use crate::core::gain::mask_saturated;
use crate::core::mars_time::mars_sun_distance_au;
use crate::core::mlr::{FitResult, NightsideTemplateFitter, PixelFit};
use crate::core::reflectance::{PixelGeometry, ReflectanceCalculator};
use crate::core::solar_flux::{pixel_wavelength_edges, SolarFluxModel};
use crate::core::swath::SwathSegmenter;
use crate::core::templates::{
    pad_spectral_axis_with_nan, rebin_wavelengths, TemplateLibrary, STANDARD_FIT_TEMPLATES,
};
use crate::types::{
    DetectorCube, InstrumentSettings, IuvsError, IuvsResult, PixelMap, PointSpreadFunction, SensitivityCurve,
    SolarReferenceSpectrum,
};
use chrono::{DateTime, Utc};
use ndarray::{s, Array1, Array2, Array3, ArrayView3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Template names as they appear in XML:
/// `<templates><template>no_nightglow</template>...</templates>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateList {
    #[serde(rename = "template", default)]
    pub names: Vec<String>,
}

impl Default for TemplateList {
    fn default() -> Self {
        Self {
            names: STANDARD_FIT_TEMPLATES.iter().map(|n| n.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NightsideOptions {
    /// Templates fitted to every pixel, in order
    pub templates: TemplateList,
    /// Replace samples above the detector well depth with NaN before fitting
    #[serde(rename = "maskSaturated")]
    pub mask_saturated: bool,
}

impl Default for NightsideOptions {
    fn default() -> Self {
        Self {
            templates: TemplateList::default(),
            mask_saturated: true,
        }
    }
}

/// How the Mars-Sun distance of an observation is obtained
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SunDistance {
    /// Known distance [AU]
    Au(f64),
    /// Computed from the observation time
    At(DateTime<Utc>),
}

impl SunDistance {
    pub fn resolve(&self) -> f64 {
        match *self {
            SunDistance::Au(distance) => distance,
            SunDistance::At(time) => mars_sun_distance_au(time),
        }
    }
}

/// One dayside data file
#[derive(Debug, Clone)]
pub struct DaysideObservation<'a> {
    pub settings: &'a InstrumentSettings,
    /// Dark-subtracted counts (integration, spatial, spectral) [DN]
    pub counts: ArrayView3<'a, f64>,
    pub geometry: &'a PixelGeometry,
    /// Scan mirror angle of every integration [degrees]
    pub mirror_angles: &'a [f64],
    pub sun_distance: SunDistance,
}

/// Ancillary inputs shared by every dayside file
#[derive(Debug, Clone)]
pub struct DaysideAncillary {
    pub sensitivity: SensitivityCurve,
    pub solar_spectrum: SolarReferenceSpectrum,
    pub psf: PointSpreadFunction,
    pub flatfield: Option<Flatfield>,
}

#[derive(Debug, Clone)]
pub struct DaysideProduct {
    pub swath_index: Vec<usize>,
    pub calibration_curve: CalibrationCurve,
    /// Solar flux per spectral bin at Mars [kR]
    pub solar_flux: Array1<f64>,
    pub mars_sun_distance_au: f64,
    /// [kR]
    pub radiance: DetectorCube,
    /// I/F, NaN where undefined
    pub reflectance: DetectorCube,
}

pub struct DaysideProcessor {
    segmenter: SwathSegmenter,
    curve_builder: CalibrationCurveBuilder,
    solar_model: SolarFluxModel,
    calculator: ReflectanceCalculator,
    sensitivity: SensitivityCurve,
    psf: PointSpreadFunction,
    flatfield: Option<Flatfield>,
}

impl DaysideProcessor {
    pub fn new(config: &PipelineConfig, ancillary: DaysideAncillary) -> IuvsResult<Self> {
        config.validate()?;
        Ok(Self {
            segmenter: SwathSegmenter::with_options(config.swath.clone()),
            curve_builder: CalibrationCurveBuilder::new(config.instrument.clone()),
            solar_model: SolarFluxModel::with_options(&ancillary.solar_spectrum, config.solar_flux.clone()),
            calculator: ReflectanceCalculator::with_options(config.reflectance.clone()),
            sensitivity: ancillary.sensitivity,
            psf: ancillary.psf,
            flatfield: ancillary.flatfield,
        })
    }

    pub fn process(&self, observation: &DaysideObservation) -> IuvsResult<DaysideProduct> {
        let settings = observation.settings;
        settings.validate()?;
        check_cube_shape(observation.counts, settings, "Counts")?;

        let (n_integrations, n_spatial, _) = observation.counts.dim();
        if observation.mirror_angles.len() != n_integrations {
            return Err(IuvsError::ShapeMismatch(format!(
                "{} mirror angles for {} integrations",
                observation.mirror_angles.len(),
                n_integrations
            )));
        }

        log::info!(
            "Processing dayside file: {} integrations, {} positions, {} spectral bins",
            n_integrations,
            n_spatial,
            settings.binning.n_spectral_bins()
        );

        let outside = self
            .curve_builder
            .constants()
            .angles_outside_scan(observation.mirror_angles);
        if outside > 0 {
            log::warn!(
                "{} of {} mirror angles lie outside the nominal scan range",
                outside,
                n_integrations
            );
        }

        let swath_index = self.segmenter.segment(observation.mirror_angles);
        let calibration_curve = self.curve_builder.build(&self.sensitivity, settings)?;

        let distance = observation.sun_distance.resolve();
        let edges = pixel_wavelength_edges(&settings.binning, &settings.wavelength_centers, settings.wavelength_width)?;
        let solar_flux = self
            .solar_model
            .rebin_to_instrument(&edges, &self.psf, &settings.binning, distance)?;

        let flatfield = match &self.flatfield {
            Some(ff) if self.calculator.options().apply_flatfield => {
                Some(ff.interpolate_to_scheme(n_spatial, &settings.wavelength_centers)?)
            }
            _ => None,
        };

        let radiance = self
            .calculator
            .radiance(observation.counts, &calibration_curve, settings.voltage, flatfield.as_ref())?;
        let reflectance = self
            .calculator
            .reflectance_from_radiance(radiance.view(), solar_flux.view(), observation.geometry)?;

        Ok(DaysideProduct {
            swath_index,
            calibration_curve,
            solar_flux,
            mars_sun_distance_au: distance,
            radiance,
            reflectance,
        })
    }
}

/// One nightside data file
#[derive(Debug, Clone)]
pub struct NightsideObservation<'a> {
    pub settings: &'a InstrumentSettings,
    /// Dark-subtracted counts (integration, spatial, spectral) [DN]
    pub counts: ArrayView3<'a, f64>,
    /// One-sigma random uncertainty of `counts` [DN]
    pub uncertainty: ArrayView3<'a, f64>,
}

/// Ancillary inputs shared by every nightside file
#[derive(Debug, Clone)]
pub struct NightsideAncillary {
    pub sensitivity: SensitivityCurve,
    /// Templates tabulated on every detector pixel
    pub templates: TemplateLibrary,
    /// Wavelength [nm] of every detector pixel
    pub detector_wavelengths: Array1<f64>,
}

#[derive(Debug, Clone)]
pub struct NightsideProduct {
    /// Brightness of every fitted template, (integration, spatial) [kR]
    pub brightness: BTreeMap<String, PixelMap>,
    pub brightness_uncertainty: BTreeMap<String, PixelMap>,
    pub aurora: PixelMap,
    pub aurora_uncertainty: PixelMap,
    pub no_nightglow: PixelMap,
    pub no_nightglow_uncertainty: PixelMap,
    pub fit_success: Array2<bool>,
    pub n_failed: usize,
    /// Full outcome of every pixel fit
    pub fits: Array2<PixelFit>,
}

pub struct NightsideProcessor {
    curve_builder: CalibrationCurveBuilder,
    sensitivity: SensitivityCurve,
    templates: TemplateLibrary,
    detector_wavelengths: Array1<f64>,
    mask_saturated: bool,
}

impl NightsideProcessor {
    pub fn new(config: &PipelineConfig, ancillary: NightsideAncillary) -> IuvsResult<Self> {
        config.validate()?;
        let names: Vec<&str> = config.nightside.templates.names.iter().map(String::as_str).collect();
        let templates = ancillary.templates.select(&names)?;

        if templates.spectral_len() != Some(ancillary.detector_wavelengths.len()) {
            return Err(IuvsError::ShapeMismatch(format!(
                "Templates have {:?} samples but the wavelength grid has {}",
                templates.spectral_len(),
                ancillary.detector_wavelengths.len()
            )));
        }

        Ok(Self {
            curve_builder: CalibrationCurveBuilder::new(config.instrument.clone()),
            sensitivity: ancillary.sensitivity,
            templates,
            detector_wavelengths: ancillary.detector_wavelengths,
            mask_saturated: config.nightside.mask_saturated,
        })
    }

    pub fn process(&self, observation: &NightsideObservation) -> IuvsResult<NightsideProduct> {
        let settings = observation.settings;
        settings.validate()?;
        settings.binning.validate_spectral_alignment()?;
        check_cube_shape(observation.counts, settings, "Counts")?;
        check_cube_shape(observation.uncertainty, settings, "Uncertainty")?;

        let width = settings.spectral_bin_width();
        let start = settings.binning.starting_spectral_index()?;
        let n_full = settings.binning.n_full_spectral_bins();
        let (n_integrations, n_spatial, _) = observation.counts.dim();

        log::info!(
            "Processing nightside file: {} integrations, {} positions, {} templates",
            n_integrations,
            n_spatial,
            self.templates.len()
        );

        let templates = self.templates.rebin(width)?;
        let full_wavelengths = rebin_wavelengths(self.detector_wavelengths.view(), width)?;
        if templates.spectral_len() != Some(n_full) {
            return Err(IuvsError::ShapeMismatch(format!(
                "Rebinned templates have {:?} bins, the full spectral grid has {}",
                templates.spectral_len(),
                n_full
            )));
        }

        let curve = self
            .curve_builder
            .build_for_wavelengths(&self.sensitivity, settings, &full_wavelengths.to_vec())?;
        let fitter = NightsideTemplateFitter::new(&templates, curve.values().view(), settings.wavelength_width)?;

        let mut counts = observation.counts.to_owned();
        if self.mask_saturated {
            let threshold = self
                .curve_builder
                .constants()
                .saturation_threshold(settings.spatial_bin_width(), width);
            mask_saturated(&mut counts, threshold);
        }
        let counts = pad_spectral_axis_with_nan(counts.view(), n_full, start)?;
        let uncertainty = pad_spectral_axis_with_nan(observation.uncertainty, n_full, start)?;

        let fits = fit_pixels(&fitter, &counts, &uncertainty)?;
        let product = assemble_nightside(fitter.parameter_names(), fits)?;

        if product.n_failed > 0 {
            log::warn!(
                "{} of {} pixel fits failed",
                product.n_failed,
                n_integrations * n_spatial
            );
        }
        Ok(product)
    }
}

fn check_cube_shape(cube: ArrayView3<f64>, settings: &InstrumentSettings, what: &str) -> IuvsResult<()> {
    let (_, n_spatial, n_spectral) = cube.dim();
    let expected = (settings.binning.n_spatial_bins(), settings.binning.n_spectral_bins());
    if (n_spatial, n_spectral) != expected {
        return Err(IuvsError::ShapeMismatch(format!(
            "{} have {} positions and {} spectral bins, binning describes {:?}",
            what, n_spatial, n_spectral, expected
        )));
    }
    Ok(())
}

fn fit_pixels(
    fitter: &NightsideTemplateFitter,
    counts: &Array3<f64>,
    uncertainty: &Array3<f64>,
) -> IuvsResult<Array2<PixelFit>> {
    let (n_integrations, n_spatial, _) = counts.dim();
    let coords: Vec<(usize, usize)> = (0..n_integrations)
        .flat_map(|i| (0..n_spatial).map(move |j| (i, j)))
        .collect();
    let fit_one = |&(i, j): &(usize, usize)| fitter.fit(counts.slice(s![i, j, ..]), uncertainty.slice(s![i, j, ..]));

    #[cfg(feature = "parallel")]
    let fits: IuvsResult<Vec<PixelFit>> = {
        use rayon::prelude::*;
        coords.par_iter().map(fit_one).collect()
    };
    #[cfg(not(feature = "parallel"))]
    let fits: IuvsResult<Vec<PixelFit>> = coords.iter().map(fit_one).collect();

    Array2::from_shape_vec((n_integrations, n_spatial), fits?)
        .map_err(|e| IuvsError::Processing(format!("Shape error: {}", e)))
}

fn assemble_nightside(parameter_names: &[String], fits: Array2<PixelFit>) -> IuvsResult<NightsideProduct> {
    let shape = fits.dim();
    let template_names = parameter_names.iter().skip(1);

    let brightness_map = |name: &str, uncertainty: bool| -> Array2<f64> {
        fits.map(|fit| {
            let values = match fit.result() {
                Some(result) if uncertainty => &result.brightness_uncertainty,
                Some(result) => &result.brightness,
                None => return f64::NAN,
            };
            values.get(name).copied().unwrap_or(f64::NAN)
        })
    };

    let mut brightness = BTreeMap::new();
    let mut brightness_uncertainty = BTreeMap::new();
    for name in template_names {
        brightness.insert(name.clone(), brightness_map(name, false));
        brightness_uncertainty.insert(name.clone(), brightness_map(name, true));
    }

    let from_result = |f: fn(&FitResult) -> f64| fits.map(|fit| fit.result().map(f).unwrap_or(f64::NAN));
    let aurora = from_result(|r| r.aurora_brightness());
    let aurora_uncertainty = from_result(|r| r.aurora_uncertainty());
    let no_nightglow = from_result(|r| r.no_nightglow_brightness());
    let no_nightglow_uncertainty = from_result(|r| r.no_nightglow_uncertainty());

    let fit_success = fits.map(PixelFit::is_fitted);
    let n_failed = fit_success.iter().filter(|ok| !**ok).count();
    log::debug!("Assembled nightside maps of shape {:?}", shape);

    Ok(NightsideProduct {
        brightness,
        brightness_uncertainty,
        aurora,
        aurora_uncertainty,
        no_nightglow,
        no_nightglow_uncertainty,
        fit_success,
        n_failed,
        fits,
    })
}
