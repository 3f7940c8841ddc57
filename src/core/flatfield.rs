//! Pixel-to-pixel response of the detector.

use crate::core::numeric::{interp, linspace};
use crate::types::{IuvsError, IuvsResult};
use ndarray::{Array2, Array3, ArrayView3, Axis, Zip};

/// Relative response indexed by (spatial position, spectral bin)
#[derive(Debug, Clone)]
pub struct Flatfield {
    values: Array2<f64>,
    wavelengths: Vec<f64>,
}

impl Flatfield {
    /// Create a flatfield whose columns are centred on `wavelengths` [nm]
    pub fn new(values: Array2<f64>, wavelengths: Vec<f64>) -> IuvsResult<Self> {
        if values.ncols() != wavelengths.len() {
            return Err(IuvsError::ShapeMismatch(format!(
                "Flatfield has {} spectral columns but {} wavelengths",
                values.ncols(),
                wavelengths.len()
            )));
        }
        if values.nrows() == 0 || wavelengths.is_empty() {
            return Err(IuvsError::InvalidFormat("Flatfield is empty".to_string()));
        }
        if wavelengths.windows(2).any(|w| w[1] <= w[0]) {
            return Err(IuvsError::InvalidFormat(
                "Flatfield wavelengths must be strictly increasing".to_string(),
            ));
        }
        Ok(Self { values, wavelengths })
    }

    /// A flatfield that leaves data unchanged
    pub fn uniform(n_positions: usize, wavelengths: Vec<f64>) -> IuvsResult<Self> {
        Self::new(Array2::ones((n_positions, wavelengths.len())), wavelengths)
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    pub fn n_positions(&self) -> usize {
        self.values.nrows()
    }

    /// Resample onto `n_positions` spatial positions and new wavelengths.
    ///
    /// Each row is first interpolated in wavelength. The new positions are
    /// then spread evenly over the span of the old ones and interpolated
    /// linearly.
    pub fn interpolate_to_scheme(&self, n_positions: usize, wavelengths: &[f64]) -> IuvsResult<Flatfield> {
        let n_old = self.n_positions();
        log::debug!(
            "Interpolating flatfield from {}x{} to {}x{}",
            n_old,
            self.wavelengths.len(),
            n_positions,
            wavelengths.len()
        );

        let rows: Vec<Vec<f64>> = self.values.axis_iter(Axis(0)).map(|r| r.to_vec()).collect();
        let by_wavelength = Array2::from_shape_fn((n_old, wavelengths.len()), |(row, col)| {
            interp(wavelengths[col], &self.wavelengths, &rows[row])
        });

        let old_positions = linspace(0.0, n_old as f64, n_old);
        let new_positions = linspace(0.0, n_old as f64, n_positions);
        let columns: Vec<Vec<f64>> = by_wavelength.axis_iter(Axis(1)).map(|c| c.to_vec()).collect();

        let resampled = Array2::from_shape_fn((n_positions, wavelengths.len()), |(row, col)| {
            interp(new_positions[row], &old_positions, &columns[col])
        });

        Flatfield::new(resampled, wavelengths.to_vec())
    }

    /// Divide every integration of `counts` (integration, spatial, spectral)
    /// by the flatfield
    pub fn apply(&self, counts: ArrayView3<f64>) -> IuvsResult<Array3<f64>> {
        let (_, n_spatial, n_spectral) = counts.dim();
        if (n_spatial, n_spectral) != self.values.dim() {
            return Err(IuvsError::ShapeMismatch(format!(
                "Flatfield {:?} does not match data with {} positions and {} spectral bins",
                self.values.dim(),
                n_spatial,
                n_spectral
            )));
        }

        let mut corrected = counts.to_owned();
        for mut frame in corrected.axis_iter_mut(Axis(0)) {
            Zip::from(&mut frame).and(&self.values).for_each(|value, &ff| {
                *value = if ff != 0.0 { *value / ff } else { f64::NAN };
            });
        }
        Ok(corrected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_apply_divides_each_integration() {
        let ff = Flatfield::new(array![[1.0, 2.0], [4.0, 0.0]], vec![200.0, 210.0]).unwrap();
        let counts = Array3::from_elem((2, 2, 2), 8.0);
        let corrected = ff.apply(counts.view()).unwrap();

        assert_eq!(corrected[[1, 0, 0]], 8.0);
        assert_eq!(corrected[[1, 0, 1]], 4.0);
        assert_eq!(corrected[[0, 1, 0]], 2.0);
        assert!(corrected[[0, 1, 1]].is_nan());

        assert!(ff.apply(Array3::zeros((1, 3, 2)).view()).is_err());
    }

    #[test]
    fn test_interpolate_wavelengths_only() {
        let ff = Flatfield::new(array![[1.0, 3.0], [2.0, 6.0]], vec![200.0, 220.0]).unwrap();
        let resampled = ff.interpolate_to_scheme(2, &[210.0, 230.0]).unwrap();
        assert_relative_eq!(resampled.values()[[0, 0]], 2.0);
        assert_relative_eq!(resampled.values()[[1, 0]], 4.0);
        assert_relative_eq!(resampled.values()[[1, 1]], 6.0);
    }

    #[test]
    fn test_interpolate_positions() {
        let ff = Flatfield::new(array![[0.0], [3.0]], vec![200.0]).unwrap();
        // Old positions at 0 and 2; new positions at 0, 1 and 2
        let resampled = ff.interpolate_to_scheme(3, &[200.0]).unwrap();
        let column: Vec<f64> = resampled.values().column(0).to_vec();
        assert_relative_eq!(column[0], 0.0);
        assert_relative_eq!(column[1], 1.5);
        assert_relative_eq!(column[2], 3.0);
    }

    #[test]
    fn test_uniform_flatfield() {
        let ff = Flatfield::uniform(3, vec![1.0, 2.0]).unwrap();
        assert_eq!(ff.n_positions(), 3);
        assert!(ff.values().iter().all(|&v| v == 1.0));
        assert!(Flatfield::new(Array2::ones((2, 3)), vec![1.0, 2.0]).is_err());
    }
}
