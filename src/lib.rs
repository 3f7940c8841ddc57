//! iuvs-l1c: radiometric calibration and spectral brightness retrieval for
//! MAVEN IUVS data
//!
//! Dayside files are turned into radiance and reflectance (I/F) using the
//! instrument calibration curve and a model of the solar flux at Mars.
//! Nightside files are decomposed pixel by pixel into emission templates to
//! retrieve auroral and nightglow brightnesses.

pub mod config;
pub mod constants;
pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use config::PipelineConfig;
pub use constants::InstrumentConstants;
pub use crate::core::{
    BinningScheme, CalibrationCurve, CalibrationCurveBuilder, DaysideProcessor, NightsideProcessor,
    NightsideTemplateFitter, PixelFit, ReflectanceCalculator, SolarFluxModel, SwathSegmenter,
};
pub use io::DataFilename;
pub use types::{
    Channel, InstrumentSettings, IuvsError, IuvsResult, PointSpreadFunction, SensitivityCurve,
    SolarReferenceSpectrum,
};

#[cfg(feature = "python")]
mod python {
    use crate::constants::InstrumentConstants;
    use crate::core::{
        mars_sun_distance_au, voltage_correction, BinningScheme, CalibrationCurveBuilder, SwathOptions,
        SwathSegmenter,
    };
    use crate::types::{InstrumentSettings, IuvsError, SensitivityCurve};
    use chrono::{DateTime, Utc};
    use numpy::{IntoPyArray, PyArray1, PyReadonlyArray1};
    use pyo3::prelude::*;

    fn to_py_err(e: IuvsError) -> PyErr {
        match e {
            IuvsError::InvalidBinning(_)
            | IuvsError::InvalidSensitivityCurve(_)
            | IuvsError::InvalidFormat(_)
            | IuvsError::ShapeMismatch(_)
            | IuvsError::InvalidFilename(_) => PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{}", e)),
            _ => PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e)),
        }
    }

    fn to_vec(array: &PyReadonlyArray1<f64>) -> Vec<f64> {
        array.as_array().to_vec()
    }

    /// Swath number of every integration
    #[pyfunction]
    #[pyo3(signature = (mirror_angles, threshold_factor = 2.0, split_on_reversal = true, reversal_fraction = 0.5))]
    fn swath_number(
        mirror_angles: PyReadonlyArray1<f64>,
        threshold_factor: f64,
        split_on_reversal: bool,
        reversal_fraction: f64,
    ) -> Vec<usize> {
        let segmenter = SwathSegmenter::with_options(SwathOptions {
            threshold_factor,
            split_on_reversal,
            reversal_fraction,
        });
        segmenter.segment(&to_vec(&mirror_angles))
    }

    /// Calibration curve [DN/kR] at the bin wavelength centres
    #[pyfunction]
    #[allow(clippy::too_many_arguments)]
    fn calibration_curve<'py>(
        py: Python<'py>,
        sensitivity_wavelengths: PyReadonlyArray1<f64>,
        sensitivity: PyReadonlyArray1<f64>,
        spatial_pixel_low: Vec<usize>,
        spatial_pixel_high: Vec<usize>,
        spectral_pixel_low: Vec<usize>,
        spectral_pixel_high: Vec<usize>,
        wavelength_centers: PyReadonlyArray1<f64>,
        wavelength_width: f64,
        voltage: f64,
        voltage_gain: f64,
        integration_time: f64,
    ) -> PyResult<&'py PyArray1<f64>> {
        let curve = SensitivityCurve::new(to_vec(&sensitivity_wavelengths), to_vec(&sensitivity)).map_err(to_py_err)?;
        let binning = BinningScheme::new(spatial_pixel_low, spatial_pixel_high, spectral_pixel_low, spectral_pixel_high)
            .map_err(to_py_err)?;
        let settings = InstrumentSettings {
            binning,
            voltage,
            voltage_gain,
            integration_time,
            wavelength_centers: to_vec(&wavelength_centers),
            wavelength_width,
        };

        let calibration = CalibrationCurveBuilder::new(InstrumentConstants::default())
            .build(&curve, &settings)
            .map_err(to_py_err)?;
        Ok(calibration.values().clone().into_pyarray(py))
    }

    /// MCP voltage correction factor
    #[pyfunction]
    #[pyo3(name = "voltage_correction")]
    fn py_voltage_correction(voltage: f64) -> f64 {
        voltage_correction(voltage)
    }

    /// Mars-Sun distance [AU] at an RFC 3339 timestamp
    #[pyfunction]
    fn mars_sun_distance(timestamp: &str) -> PyResult<f64> {
        let time = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|e| PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("Invalid timestamp: {}", e)))?
            .with_timezone(&Utc);
        Ok(mars_sun_distance_au(time))
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(swath_number, m)?)?;
        m.add_function(wrap_pyfunction!(calibration_curve, m)?)?;
        m.add_function(wrap_pyfunction!(py_voltage_correction, m)?)?;
        m.add_function(wrap_pyfunction!(mars_sun_distance, m)?)?;
        Ok(())
    }
}
