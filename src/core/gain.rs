//! Detector gain corrections applied to raw counts.

use crate::types::{InstrumentSettings, IuvsError, IuvsResult};
use crate::core::numeric::interp;
use ndarray::{Array2, Array3, ArrayView3, Zip};

/// MCP gain at which the non-linear gain table was measured
pub const REFERENCE_MCP_GAIN: f64 = 50.909455;

/// Multiplicative correction for the MCP voltage `voltage` [V]
pub fn voltage_correction(voltage: f64) -> f64 {
    2.925 - 0.0045167 * voltage + 2.7333e-6 * voltage * voltage
}

/// Non-linear gain coefficients tabulated against MCP voltage.
///
/// The corrected normalised signal is `exp(a + b ln x)` for a normalised
/// signal `x`, with `a` and `b` interpolated at the observation voltage.
#[derive(Debug, Clone)]
pub struct NonlinearGainTable {
    voltages: Vec<f64>,
    a: Vec<f64>,
    b: Vec<f64>,
    reference_gain: f64,
}

impl NonlinearGainTable {
    pub fn new(voltages: Vec<f64>, a: Vec<f64>, b: Vec<f64>) -> IuvsResult<Self> {
        if voltages.is_empty() || voltages.len() != a.len() || voltages.len() != b.len() {
            return Err(IuvsError::InvalidFormat(format!(
                "Gain table needs matching non-empty columns (got {}, {}, {})",
                voltages.len(),
                a.len(),
                b.len()
            )));
        }
        if voltages.windows(2).any(|w| w[1] <= w[0]) {
            return Err(IuvsError::InvalidFormat(
                "Gain table voltages must be strictly increasing".to_string(),
            ));
        }

        Ok(Self {
            voltages,
            a,
            b,
            reference_gain: REFERENCE_MCP_GAIN,
        })
    }

    /// Build from an (n, 3) table of voltage, `a` and `b` columns
    pub fn from_table(table: &Array2<f64>) -> IuvsResult<Self> {
        if table.ncols() < 3 {
            return Err(IuvsError::InvalidFormat(format!(
                "Gain table needs 3 columns, found {}",
                table.ncols()
            )));
        }
        Self::new(
            table.column(0).to_vec(),
            table.column(1).to_vec(),
            table.column(2).to_vec(),
        )
    }

    pub fn with_reference_gain(mut self, reference_gain: f64) -> Self {
        self.reference_gain = reference_gain;
        self
    }

    /// `(a, b)` at `voltage`, clamped to the tabulated voltage range
    pub fn coefficients(&self, voltage: f64) -> (f64, f64) {
        (
            interp(voltage, &self.voltages, &self.a),
            interp(voltage, &self.voltages, &self.b),
        )
    }

    /// Per-sample correction factor for a cube of dark-subtracted counts.
    ///
    /// Samples with no positive signal get NaN.
    pub fn correction(&self, counts: ArrayView3<f64>, settings: &InstrumentSettings) -> Array3<f64> {
        let (a, b) = self.coefficients(settings.voltage);
        let normaliser = settings.integration_time
            * settings.spatial_bin_width() as f64
            * settings.spectral_bin_width() as f64;
        let gain_ratio = settings.voltage_gain / self.reference_gain;

        log::debug!(
            "Non-linear gain at {:.1} V: a = {:.5}, b = {:.5}",
            settings.voltage,
            a,
            b
        );

        counts.mapv(|dn| {
            let normalised = dn / normaliser;
            if !(normalised.is_finite() && normalised > 0.0) {
                return f64::NAN;
            }
            (a + b * normalised.ln()).exp() / normalised * gain_ratio
        })
    }
}

/// Replace samples above `threshold` [DN] with NaN, returning how many were
/// replaced
pub fn mask_saturated(counts: &mut Array3<f64>, threshold: f64) -> usize {
    let mut masked = 0;
    Zip::from(counts).for_each(|value| {
        if *value > threshold {
            *value = f64::NAN;
            masked += 1;
        }
    });
    if masked > 0 {
        log::warn!("Masked {} saturated samples above {:.0} DN", masked, threshold);
    }
    masked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::binning::BinningScheme;
    use approx::assert_relative_eq;

    fn settings() -> InstrumentSettings {
        InstrumentSettings {
            binning: BinningScheme::uniform(0, 2, 1, 0, 4, 2).unwrap(),
            voltage: 700.0,
            voltage_gain: REFERENCE_MCP_GAIN,
            integration_time: 2.0,
            wavelength_centers: vec![200.0, 210.0],
            wavelength_width: 1.0,
        }
    }

    #[test]
    fn test_voltage_correction_polynomial() {
        assert_relative_eq!(voltage_correction(0.0), 2.925);
        assert_relative_eq!(
            voltage_correction(700.0),
            2.925 - 0.0045167 * 700.0 + 2.7333e-6 * 490000.0,
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_identity_gain_table() {
        let table = NonlinearGainTable::new(vec![600.0, 800.0], vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        let counts = Array3::from_elem((1, 1, 2), 160.0);
        let correction = table.correction(counts.view(), &settings());
        for &c in correction.iter() {
            assert_relative_eq!(c, 1.0, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_power_law_correction() {
        // exp(ln 2 + 0.5 ln x) / x = 2 / sqrt(x)
        let table = NonlinearGainTable::new(vec![600.0, 800.0], vec![2f64.ln(); 2], vec![0.5, 0.5]).unwrap();
        let counts = Array3::from_shape_vec((1, 1, 2), vec![64.0, -1.0]).unwrap();
        let correction = table.correction(counts.view(), &settings());
        // normalised = 64 / (2 * 2 * 4) = 4
        assert_relative_eq!(correction[[0, 0, 0]], 1.0, max_relative = 1e-12);
        assert!(correction[[0, 0, 1]].is_nan());
    }

    #[test]
    fn test_coefficients_interpolate_in_voltage() {
        let table = NonlinearGainTable::new(vec![600.0, 800.0], vec![0.0, 1.0], vec![1.0, 3.0]).unwrap();
        let (a, b) = table.coefficients(650.0);
        assert_relative_eq!(a, 0.25);
        assert_relative_eq!(b, 1.5);
        assert_eq!(table.coefficients(900.0), (1.0, 3.0));
    }

    #[test]
    fn test_mask_saturated() {
        let mut counts = Array3::from_shape_vec((1, 1, 4), vec![10.0, 3401.0, 3400.0, f64::NAN]).unwrap();
        assert_eq!(mask_saturated(&mut counts, 3400.0), 1);
        assert!(counts[[0, 0, 1]].is_nan());
        assert_eq!(counts[[0, 0, 2]], 3400.0);
    }
}
