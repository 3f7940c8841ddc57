//! Mapping between detector pixels and the bins of an observation.
//!
//! IUVS files record, for every spatial and spectral bin, the first and last
//! detector pixel (inclusive) that were summed on board. All pixel/bin
//! arithmetic used elsewhere in the crate goes through [`BinningScheme`].

use crate::constants::DETECTOR_PIXELS;
use crate::types::{IuvsError, IuvsResult};
use serde::{Deserialize, Serialize};

/// Binning table of one observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinningScheme {
    spatial_pixel_low: Vec<usize>,
    spatial_pixel_high: Vec<usize>,
    spectral_pixel_low: Vec<usize>,
    spectral_pixel_high: Vec<usize>,
    detector_pixels: usize,
}

impl BinningScheme {
    /// Create a binning scheme from inclusive pixel edges.
    ///
    /// Every axis needs at least one bin, bins must be ordered and
    /// non-overlapping, and all pixels must lie on the detector.
    pub fn new(
        spatial_pixel_low: Vec<usize>,
        spatial_pixel_high: Vec<usize>,
        spectral_pixel_low: Vec<usize>,
        spectral_pixel_high: Vec<usize>,
    ) -> IuvsResult<Self> {
        Self::with_detector_size(
            spatial_pixel_low,
            spatial_pixel_high,
            spectral_pixel_low,
            spectral_pixel_high,
            DETECTOR_PIXELS,
        )
    }

    pub fn with_detector_size(
        spatial_pixel_low: Vec<usize>,
        spatial_pixel_high: Vec<usize>,
        spectral_pixel_low: Vec<usize>,
        spectral_pixel_high: Vec<usize>,
        detector_pixels: usize,
    ) -> IuvsResult<Self> {
        check_axis("spatial", &spatial_pixel_low, &spatial_pixel_high, detector_pixels)?;
        check_axis("spectral", &spectral_pixel_low, &spectral_pixel_high, detector_pixels)?;

        Ok(Self {
            spatial_pixel_low,
            spatial_pixel_high,
            spectral_pixel_low,
            spectral_pixel_high,
            detector_pixels,
        })
    }

    /// Evenly spaced, contiguous bins on both axes
    pub fn uniform(
        spatial_start: usize,
        spatial_width: usize,
        n_spatial: usize,
        spectral_start: usize,
        spectral_width: usize,
        n_spectral: usize,
    ) -> IuvsResult<Self> {
        if spatial_width == 0 || spectral_width == 0 {
            return Err(IuvsError::InvalidBinning(
                "Bin widths must be at least one pixel".to_string(),
            ));
        }

        let edges = |start: usize, width: usize, n: usize| -> (Vec<usize>, Vec<usize>) {
            let low: Vec<usize> = (0..n).map(|i| start + i * width).collect();
            let high = low.iter().map(|&l| l + width - 1).collect();
            (low, high)
        };
        let (spa_low, spa_high) = edges(spatial_start, spatial_width, n_spatial);
        let (spe_low, spe_high) = edges(spectral_start, spectral_width, n_spectral);

        Self::new(spa_low, spa_high, spe_low, spe_high)
    }

    pub fn n_spatial_bins(&self) -> usize {
        self.spatial_pixel_low.len()
    }

    pub fn n_spectral_bins(&self) -> usize {
        self.spectral_pixel_low.len()
    }

    pub fn detector_pixels(&self) -> usize {
        self.detector_pixels
    }

    /// Width of the first spatial bin [pixels]
    pub fn spatial_bin_width(&self) -> usize {
        self.spatial_pixel_high[0] - self.spatial_pixel_low[0] + 1
    }

    /// Width of the first spectral bin [pixels]
    pub fn spectral_bin_width(&self) -> usize {
        self.spectral_pixel_high[0] - self.spectral_pixel_low[0] + 1
    }

    pub fn spatial_bin_low(&self) -> &[usize] {
        &self.spatial_pixel_low
    }

    pub fn spatial_bin_high(&self) -> &[usize] {
        &self.spatial_pixel_high
    }

    pub fn spectral_bin_low(&self) -> &[usize] {
        &self.spectral_pixel_low
    }

    pub fn spectral_bin_high(&self) -> &[usize] {
        &self.spectral_pixel_high
    }

    /// Spectral bin containing detector pixel `pixel`, if any
    pub fn pixel_to_bin(&self, pixel: usize) -> Option<usize> {
        let candidate = self.spectral_pixel_low.partition_point(|&low| low <= pixel);
        if candidate == 0 {
            return None;
        }
        let bin = candidate - 1;
        (pixel <= self.spectral_pixel_high[bin]).then_some(bin)
    }

    /// Half-open detector-pixel range `[start, end)` of spectral bin `bin`
    pub fn bin_edges_in_pixels(&self, bin: usize) -> Option<(usize, usize)> {
        let low = *self.spectral_pixel_low.get(bin)?;
        let high = *self.spectral_pixel_high.get(bin)?;
        Some((low, high + 1))
    }

    /// Pixel cut points of consecutive spectral bins: the low edge of every bin
    /// followed by one past the last pixel of the final bin
    pub fn spectral_pixel_edges(&self) -> Vec<usize> {
        let mut edges = self.spectral_pixel_low.clone();
        edges.push(self.spectral_pixel_high[self.spectral_pixel_high.len() - 1] + 1);
        edges
    }

    /// Detector-pixel coordinate of the centre of each spectral bin
    pub fn spectral_bin_centers(&self) -> Vec<f64> {
        self.spectral_pixel_low
            .iter()
            .zip(&self.spectral_pixel_high)
            .map(|(&low, &high)| (low + high + 1) as f64 / 2.0)
            .collect()
    }

    /// Number of spectral bins when the full detector is binned at the
    /// observation's spectral bin width
    pub fn n_full_spectral_bins(&self) -> usize {
        self.detector_pixels / self.spectral_bin_width()
    }

    /// Index of the first transmitted spectral bin within the full grid
    pub fn starting_spectral_index(&self) -> IuvsResult<usize> {
        let width = self.spectral_bin_width();
        let start = self.spectral_pixel_low[0];
        if start % width != 0 {
            return Err(IuvsError::InvalidBinning(format!(
                "Spectral offset {} is not a multiple of the spectral bin width {}",
                start, width
            )));
        }
        Ok(start / width)
    }

    /// Check that the transmitted spectral bins line up with the full grid.
    ///
    /// Every bin must start on a multiple of the bin width, have that width,
    /// and the transmitted bins must fit inside the full grid.
    pub fn validate_spectral_alignment(&self) -> IuvsResult<()> {
        let width = self.spectral_bin_width();
        let start = self.starting_spectral_index()?;

        for (bin, (&low, &high)) in self
            .spectral_pixel_low
            .iter()
            .zip(&self.spectral_pixel_high)
            .enumerate()
        {
            if low % width != 0 || high + 1 - low != width {
                return Err(IuvsError::InvalidBinning(format!(
                    "Spectral bin {} spans pixels {}..={}, not aligned to width {}",
                    bin, low, high, width
                )));
            }
        }

        if start + self.n_spectral_bins() > self.n_full_spectral_bins() {
            return Err(IuvsError::InvalidBinning(format!(
                "{} spectral bins starting at {} exceed the full grid of {}",
                self.n_spectral_bins(),
                start,
                self.n_full_spectral_bins()
            )));
        }
        Ok(())
    }
}

fn check_axis(axis: &str, low: &[usize], high: &[usize], detector_pixels: usize) -> IuvsResult<()> {
    if low.is_empty() {
        return Err(IuvsError::InvalidBinning(format!("No {} bins", axis)));
    }
    if low.len() != high.len() {
        return Err(IuvsError::InvalidBinning(format!(
            "{} {} low edges but {} high edges",
            low.len(),
            axis,
            high.len()
        )));
    }
    for (bin, (&l, &h)) in low.iter().zip(high).enumerate() {
        if h < l {
            return Err(IuvsError::InvalidBinning(format!(
                "{} bin {} ends before it starts ({} > {})",
                axis, bin, l, h
            )));
        }
        if h >= detector_pixels {
            return Err(IuvsError::InvalidBinning(format!(
                "{} bin {} reaches pixel {} on a {}-pixel detector",
                axis, bin, h, detector_pixels
            )));
        }
    }
    if let Some(bin) = low.windows(2).zip(high).position(|(w, &h)| w[1] <= h) {
        return Err(IuvsError::InvalidBinning(format!(
            "{} bins {} and {} overlap or are out of order",
            axis,
            bin,
            bin + 1
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_scheme_geometry() {
        let scheme = BinningScheme::uniform(89, 4, 10, 174, 6, 19).unwrap();
        assert_eq!(scheme.n_spatial_bins(), 10);
        assert_eq!(scheme.n_spectral_bins(), 19);
        assert_eq!(scheme.spatial_bin_width(), 4);
        assert_eq!(scheme.spectral_bin_width(), 6);
        assert_eq!(scheme.n_full_spectral_bins(), 170);
        assert_eq!(scheme.starting_spectral_index().unwrap(), 29);
        assert!(scheme.validate_spectral_alignment().is_ok());
    }

    #[test]
    fn test_pixel_to_bin() {
        let scheme = BinningScheme::new(vec![0], vec![0], vec![10, 20], vec![14, 29]).unwrap();
        assert_eq!(scheme.pixel_to_bin(9), None);
        assert_eq!(scheme.pixel_to_bin(10), Some(0));
        assert_eq!(scheme.pixel_to_bin(14), Some(0));
        assert_eq!(scheme.pixel_to_bin(15), None);
        assert_eq!(scheme.pixel_to_bin(29), Some(1));
        assert_eq!(scheme.pixel_to_bin(30), None);
        assert_eq!(scheme.bin_edges_in_pixels(1), Some((20, 30)));
        assert_eq!(scheme.bin_edges_in_pixels(2), None);
    }

    #[test]
    fn test_pixel_edges_and_centres() {
        let scheme = BinningScheme::uniform(0, 1, 1, 8, 4, 3).unwrap();
        assert_eq!(scheme.spectral_pixel_edges(), vec![8, 12, 16, 20]);
        assert_eq!(scheme.spectral_bin_centers(), vec![10.0, 14.0, 18.0]);
    }

    #[test]
    fn test_misaligned_offset_is_rejected() {
        let scheme = BinningScheme::uniform(0, 1, 1, 175, 6, 19).unwrap();
        assert!(matches!(
            scheme.starting_spectral_index(),
            Err(IuvsError::InvalidBinning(_))
        ));
        assert!(scheme.validate_spectral_alignment().is_err());
    }

    #[test]
    fn test_overlapping_bins_are_rejected() {
        let result = BinningScheme::new(vec![0], vec![0], vec![0, 3], vec![4, 7]);
        assert!(matches!(result, Err(IuvsError::InvalidBinning(_))));

        let off_detector = BinningScheme::new(vec![0], vec![1024], vec![0], vec![0]);
        assert!(off_detector.is_err());
    }
}
