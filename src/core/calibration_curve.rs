//! Conversion factors from detector counts to kilorayleighs.

use crate::constants::{InstrumentConstants, KILORAYLEIGH};
use crate::core::binning::BinningScheme;
use crate::core::numeric::interp;
use crate::types::{InstrumentSettings, IuvsError, IuvsResult, SensitivityCurve};
use ndarray::{Array1, Array2};

/// Detector response [DN/kR] of every spectral bin of one observation.
///
/// The value does not depend on the spatial bin, so a single row is stored
/// and broadcast on request.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationCurve {
    values: Array1<f64>,
    n_spatial_bins: usize,
}

impl CalibrationCurve {
    pub fn new(values: Array1<f64>, n_spatial_bins: usize) -> Self {
        Self {
            values,
            n_spatial_bins,
        }
    }

    /// Response of each spectral bin [DN/kR]
    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn n_spatial_bins(&self) -> usize {
        self.n_spatial_bins
    }

    /// The curve repeated for every spatial bin, shape (spatial, spectral)
    pub fn to_array2(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.n_spatial_bins, self.values.len()), |(_, bin)| self.values[bin])
    }
}

/// Builds [`CalibrationCurve`]s from a sensitivity curve and the observation
/// settings
#[derive(Debug, Clone, Default)]
pub struct CalibrationCurveBuilder {
    constants: InstrumentConstants,
}

impl CalibrationCurveBuilder {
    pub fn new(constants: InstrumentConstants) -> Self {
        Self { constants }
    }

    pub fn constants(&self) -> &InstrumentConstants {
        &self.constants
    }

    /// Calibration curve at the observation's wavelength centres.
    ///
    /// Fails with [`IuvsError::InvalidBinning`] when the spectral bins do not
    /// sit on multiples of the spectral bin width.
    pub fn build(&self, sensitivity: &SensitivityCurve, settings: &InstrumentSettings) -> IuvsResult<CalibrationCurve> {
        settings.validate()?;
        settings.binning.validate_spectral_alignment()?;

        log::info!(
            "Building calibration curve for {} spectral bins",
            settings.wavelength_centers.len()
        );
        self.build_for_wavelengths(sensitivity, settings, &settings.wavelength_centers)
    }

    /// Calibration curve evaluated at arbitrary wavelengths [nm] with the gain,
    /// integration time and bin geometry of `settings`
    pub fn build_for_wavelengths(
        &self,
        sensitivity: &SensitivityCurve,
        settings: &InstrumentSettings,
        wavelengths: &[f64],
    ) -> IuvsResult<CalibrationCurve> {
        if wavelengths.is_empty() {
            return Err(IuvsError::InvalidFormat(
                "No wavelengths to evaluate the calibration curve at".to_string(),
            ));
        }
        warn_on_partial_coverage(sensitivity, wavelengths);

        let omega = self.constants.bin_solid_angle(settings.spatial_bin_width());
        let scale = settings.wavelength_width * settings.voltage_gain * settings.integration_time * KILORAYLEIGH * omega;
        log::debug!(
            "Calibration scale {:.4e} (bin solid angle {:.4e} sr)",
            scale,
            omega
        );

        let values: Array1<f64> = wavelengths
            .iter()
            .map(|&w| scale * interp(w, sensitivity.wavelengths(), sensitivity.responsivity()))
            .collect();

        Ok(CalibrationCurve::new(values, settings.binning.n_spatial_bins()))
    }
}

fn warn_on_partial_coverage(sensitivity: &SensitivityCurve, wavelengths: &[f64]) {
    let (low, high) = sensitivity.domain();
    let outside = wavelengths.iter().filter(|&&w| w < low || w > high).count();
    if outside > 0 {
        log::warn!(
            "{} of {} wavelengths fall outside the sensitivity curve ({:.2}-{:.2} nm); edge values used",
            outside,
            wavelengths.len(),
            low,
            high
        );
    }
}

/// Average a per-detector-pixel calibration factor over the pixels of each
/// spectral bin
pub fn rebin_calibration_factor(factor: &[f64], binning: &BinningScheme) -> IuvsResult<Array1<f64>> {
    let last = binning.spectral_bin_high().iter().copied().max().unwrap_or(0);
    if last >= factor.len() {
        return Err(IuvsError::ShapeMismatch(format!(
            "Calibration factor has {} pixels but the binning reaches pixel {}",
            factor.len(),
            last
        )));
    }

    Ok(binning
        .spectral_bin_low()
        .iter()
        .zip(binning.spectral_bin_high())
        .map(|(&low, &high)| {
            let pixels = &factor[low..=high];
            pixels.iter().sum::<f64>() / pixels.len() as f64
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn settings(integration_time: f64) -> InstrumentSettings {
        let binning = BinningScheme::uniform(0, 1, 3, 0, 1, 4).unwrap();
        InstrumentSettings {
            binning,
            voltage: 700.0,
            voltage_gain: 1.0,
            integration_time,
            wavelength_centers: vec![200.0, 220.0, 240.0, 260.0],
            wavelength_width: 1.0,
        }
    }

    fn flat_sensitivity() -> SensitivityCurve {
        SensitivityCurve::new(vec![100.0, 400.0], vec![1.0, 1.0]).unwrap()
    }

    #[test]
    fn test_unit_settings_give_kr_times_pixel_omega() {
        let builder = CalibrationCurveBuilder::default();
        let curve = builder.build(&flat_sensitivity(), &settings(1.0)).unwrap();

        let expected = KILORAYLEIGH * InstrumentConstants::default().pixel_solid_angle();
        for &value in curve.values() {
            assert_relative_eq!(value, expected, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_linear_in_integration_time() {
        let builder = CalibrationCurveBuilder::default();
        let single = builder.build(&flat_sensitivity(), &settings(1.0)).unwrap();
        let double = builder.build(&flat_sensitivity(), &settings(2.0)).unwrap();
        for (a, b) in single.values().iter().zip(double.values()) {
            assert_relative_eq!(2.0 * a, *b, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_sensitivity_clamps_outside_domain() {
        let sensitivity = SensitivityCurve::new(vec![210.0, 250.0], vec![2.0, 4.0]).unwrap();
        let curve = CalibrationCurveBuilder::default()
            .build(&sensitivity, &settings(1.0))
            .unwrap();
        let unit = KILORAYLEIGH * InstrumentConstants::default().pixel_solid_angle();
        assert_relative_eq!(curve.values()[0], 2.0 * unit, max_relative = 1e-12);
        assert_relative_eq!(curve.values()[1], 2.5 * unit, max_relative = 1e-12);
        assert_relative_eq!(curve.values()[3], 4.0 * unit, max_relative = 1e-12);
    }

    #[test]
    fn test_misaligned_binning_fails() {
        let mut bad = settings(1.0);
        bad.binning = BinningScheme::uniform(0, 1, 3, 3, 2, 4).unwrap();
        let result = CalibrationCurveBuilder::default().build(&flat_sensitivity(), &bad);
        assert!(matches!(result, Err(IuvsError::InvalidBinning(_))));
    }

    #[test]
    fn test_broadcast_to_spatial_bins() {
        let curve = CalibrationCurve::new(Array1::from(vec![1.0, 2.0]), 3);
        let full = curve.to_array2();
        assert_eq!(full.dim(), (3, 2));
        assert_eq!(full[[2, 1]], 2.0);
    }

    #[test]
    fn test_rebin_calibration_factor_takes_means() {
        let binning = BinningScheme::uniform(0, 1, 1, 2, 2, 2).unwrap();
        let factor = [9.0, 9.0, 1.0, 3.0, 5.0, 7.0, 9.0];
        let rebinned = rebin_calibration_factor(&factor, &binning).unwrap();
        assert_eq!(rebinned.to_vec(), vec![2.0, 6.0]);

        assert!(rebin_calibration_factor(&factor[..5], &binning).is_err());
    }
}
