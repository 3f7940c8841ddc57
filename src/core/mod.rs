//! Core IUVS processing modules

pub mod binning;
pub mod calibration_curve;
pub mod flatfield;
pub mod gain;
pub mod mars_time;
pub mod mlr;
pub mod numeric;
pub mod pipeline;
pub mod reflectance;
pub mod solar_flux;
pub mod swath;
pub mod templates;

// Re-export main types
pub use binning::BinningScheme;
pub use calibration_curve::{rebin_calibration_factor, CalibrationCurve, CalibrationCurveBuilder};
pub use flatfield::Flatfield;
pub use gain::{mask_saturated, voltage_correction, NonlinearGainTable};
pub use mars_time::{mars_sun_distance_au, MarsTime};
pub use mlr::{FitFailure, FitResult, NightsideTemplateFitter, PixelFit};
pub use pipeline::{
    DaysideAncillary, DaysideObservation, DaysideProcessor, DaysideProduct, NightsideAncillary,
    NightsideObservation, NightsideOptions, NightsideProcessor, NightsideProduct, SunDistance,
};
pub use reflectance::{PixelGeometry, ReflectanceCalculator, ReflectanceOptions};
pub use solar_flux::{pixel_wavelength_edges, SolarFluxModel, SolarFluxOptions};
pub use swath::{count_integrations_in_swath, select_swath, swath_integration_range, SwathOptions, SwathSegmenter};
pub use templates::TemplateLibrary;
