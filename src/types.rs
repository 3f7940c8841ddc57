use crate::core::binning::BinningScheme;
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

/// Detector counts or derived quantities (integration x spatial bin x spectral bin)
pub type DetectorCube = Array3<f64>;

/// Per-pixel geometry such as solar zenith angle (integration x spatial bin)
pub type PixelMap = Array2<f64>;

/// Instrument channel recorded in IUVS data products
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Muv,
    Fuv,
    Ech,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Muv => write!(f, "muv"),
            Channel::Fuv => write!(f, "fuv"),
            Channel::Ech => write!(f, "ech"),
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = IuvsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "muv" => Ok(Channel::Muv),
            "fuv" => Ok(Channel::Fuv),
            "ech" => Ok(Channel::Ech),
            _ => Err(IuvsError::InvalidFormat(format!("Unknown channel: {}", s))),
        }
    }
}

/// Observation settings of a single data file.
///
/// The bin geometry is held by the embedded [`BinningScheme`]; the remaining
/// fields come from the observation metadata. Nothing here changes once the
/// file has been opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentSettings {
    pub binning: BinningScheme,
    /// MCP voltage [V]
    pub voltage: f64,
    /// MCP voltage gain
    pub voltage_gain: f64,
    /// Integration time [s]
    pub integration_time: f64,
    /// Wavelength at the centre of each transmitted spectral bin [nm]
    pub wavelength_centers: Vec<f64>,
    /// Wavelength width of a spectral bin [nm]
    pub wavelength_width: f64,
}

impl InstrumentSettings {
    pub fn spatial_bin_width(&self) -> usize {
        self.binning.spatial_bin_width()
    }

    pub fn spectral_bin_width(&self) -> usize {
        self.binning.spectral_bin_width()
    }

    pub fn spectral_bin_low(&self) -> &[usize] {
        self.binning.spectral_bin_low()
    }

    pub fn spectral_bin_high(&self) -> &[usize] {
        self.binning.spectral_bin_high()
    }

    /// Check that the settings describe a usable observation
    pub fn validate(&self) -> IuvsResult<()> {
        if self.wavelength_centers.len() != self.binning.n_spectral_bins() {
            return Err(IuvsError::ShapeMismatch(format!(
                "{} wavelength centers given for {} spectral bins",
                self.wavelength_centers.len(),
                self.binning.n_spectral_bins()
            )));
        }
        if !(self.integration_time.is_finite() && self.integration_time > 0.0) {
            return Err(IuvsError::InvalidFormat(format!(
                "Integration time must be positive, got {}",
                self.integration_time
            )));
        }
        if !(self.wavelength_width.is_finite() && self.wavelength_width > 0.0) {
            return Err(IuvsError::InvalidFormat(format!(
                "Wavelength width must be positive, got {}",
                self.wavelength_width
            )));
        }
        Ok(())
    }
}

/// Detector responsivity as a function of wavelength
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityCurve {
    wavelengths: Vec<f64>,
    responsivity: Vec<f64>,
}

impl SensitivityCurve {
    /// Create a sensitivity curve from (wavelength [nm], responsivity) pairs.
    ///
    /// Wavelengths must be finite and strictly increasing.
    pub fn new(wavelengths: Vec<f64>, responsivity: Vec<f64>) -> IuvsResult<Self> {
        if wavelengths.is_empty() {
            return Err(IuvsError::InvalidSensitivityCurve(
                "Sensitivity curve has no samples".to_string(),
            ));
        }
        if wavelengths.len() != responsivity.len() {
            return Err(IuvsError::InvalidSensitivityCurve(format!(
                "{} wavelengths but {} responsivity values",
                wavelengths.len(),
                responsivity.len()
            )));
        }
        ensure_increasing(&wavelengths).map_err(IuvsError::InvalidSensitivityCurve)?;

        Ok(Self {
            wavelengths,
            responsivity,
        })
    }

    /// Build from an (n, 2) table of wavelength and responsivity columns
    pub fn from_table(table: &Array2<f64>) -> IuvsResult<Self> {
        if table.ncols() < 2 {
            return Err(IuvsError::InvalidSensitivityCurve(format!(
                "Expected 2 columns, found {}",
                table.ncols()
            )));
        }
        Self::new(table.column(0).to_vec(), table.column(1).to_vec())
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    pub fn responsivity(&self) -> &[f64] {
        &self.responsivity
    }

    /// Wavelength domain covered by the tabulated samples
    pub fn domain(&self) -> (f64, f64) {
        (self.wavelengths[0], self.wavelengths[self.wavelengths.len() - 1])
    }
}

/// Solar irradiance spectrum at 1 AU, as (wavelength [nm], irradiance [W/m²/nm])
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolarReferenceSpectrum {
    wavelengths: Vec<f64>,
    irradiance: Vec<f64>,
}

impl SolarReferenceSpectrum {
    pub fn new(wavelengths: Vec<f64>, irradiance: Vec<f64>) -> IuvsResult<Self> {
        if wavelengths.is_empty() {
            return Err(IuvsError::InvalidFormat(
                "Solar spectrum has no samples".to_string(),
            ));
        }
        if wavelengths.len() != irradiance.len() {
            return Err(IuvsError::InvalidFormat(format!(
                "{} wavelengths but {} irradiance values in solar spectrum",
                wavelengths.len(),
                irradiance.len()
            )));
        }
        ensure_increasing(&wavelengths).map_err(IuvsError::InvalidFormat)?;

        Ok(Self {
            wavelengths,
            irradiance,
        })
    }

    pub fn from_table(table: &Array2<f64>) -> IuvsResult<Self> {
        if table.ncols() < 2 {
            return Err(IuvsError::InvalidFormat(format!(
                "Expected at least 2 columns in solar spectrum, found {}",
                table.ncols()
            )));
        }
        Self::new(table.column(0).to_vec(), table.column(1).to_vec())
    }

    /// Combine two spectra: `self` is kept below `low_cut` and above `high_cut`,
    /// `fill` supplies everything in between.
    ///
    /// This is how a high-resolution reference (e.g. SOLAR-ISS) is merged with a
    /// monthly proxy (e.g. SOLSTICE) that only covers the instrument window.
    pub fn splice(&self, fill: &SolarReferenceSpectrum, low_cut: f64, high_cut: f64) -> IuvsResult<Self> {
        if low_cut >= high_cut {
            return Err(IuvsError::InvalidFormat(format!(
                "Splice window is empty: {} >= {}",
                low_cut, high_cut
            )));
        }

        let mut wavelengths = Vec::new();
        let mut irradiance = Vec::new();

        let below = self.wavelengths.iter().zip(&self.irradiance).filter(|&(&w, _)| w < low_cut);
        let inside = fill
            .wavelengths
            .iter()
            .zip(&fill.irradiance)
            .filter(|&(&w, _)| w >= low_cut && w <= high_cut);
        let above = self.wavelengths.iter().zip(&self.irradiance).filter(|&(&w, _)| w > high_cut);

        for (&w, &f) in below.chain(inside).chain(above) {
            wavelengths.push(w);
            irradiance.push(f);
        }

        log::debug!(
            "Spliced solar spectrum: {} samples ({} from fill spectrum)",
            wavelengths.len(),
            fill.wavelengths.iter().filter(|&&w| w >= low_cut && w <= high_cut).count()
        );

        Self::new(wavelengths, irradiance)
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    pub fn irradiance(&self) -> &[f64] {
        &self.irradiance
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.wavelengths[0], self.wavelengths[self.wavelengths.len() - 1])
    }
}

/// Instrument line-spread kernel indexed by detector-pixel offset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointSpreadFunction {
    weights: Vec<f64>,
}

impl PointSpreadFunction {
    /// Create a PSF, normalising the weights to unit sum
    pub fn new(weights: Vec<f64>) -> IuvsResult<Self> {
        if weights.is_empty() {
            return Err(IuvsError::InvalidFormat(
                "Point spread function has no weights".to_string(),
            ));
        }
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(IuvsError::InvalidFormat(
                "Point spread function contains non-finite weights".to_string(),
            ));
        }

        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(IuvsError::InvalidFormat(format!(
                "Point spread function must have a positive sum, got {}",
                total
            )));
        }

        Ok(Self {
            weights: weights.into_iter().map(|w| w / total).collect(),
        })
    }

    /// Kernel that leaves a signal unchanged
    pub fn delta() -> Self {
        Self { weights: vec![1.0] }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

fn ensure_increasing(values: &[f64]) -> Result<(), String> {
    if let Some(bad) = values.iter().position(|v| !v.is_finite()) {
        return Err(format!("Non-finite wavelength at index {}", bad));
    }
    if let Some(i) = values.windows(2).position(|w| w[1] <= w[0]) {
        return Err(format!(
            "Wavelengths must be strictly increasing (index {}: {} then {})",
            i,
            values[i],
            values[i + 1]
        ));
    }
    Ok(())
}

/// Error types for IUVS processing
#[derive(Debug, thiserror::Error)]
pub enum IuvsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid binning table: {0}")]
    InvalidBinning(String),

    #[error("Invalid sensitivity curve: {0}")]
    InvalidSensitivityCurve(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),
}

/// Result type for IUVS operations
pub type IuvsResult<T> = Result<T, IuvsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_psf_is_normalised() {
        let psf = PointSpreadFunction::new(vec![1.0, 2.0, 1.0]).unwrap();
        assert!((psf.weights().iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((psf.weights()[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_psf_rejects_zero_sum() {
        assert!(PointSpreadFunction::new(vec![0.0, 0.0]).is_err());
        assert!(PointSpreadFunction::new(vec![]).is_err());
    }

    #[test]
    fn test_sensitivity_curve_must_increase() {
        let result = SensitivityCurve::new(vec![200.0, 250.0, 240.0], vec![1.0, 1.0, 1.0]);
        assert!(matches!(result, Err(IuvsError::InvalidSensitivityCurve(_))));
    }

    #[test]
    fn test_solar_splice_keeps_fill_inside_window() {
        let base = SolarReferenceSpectrum::new(
            vec![100.0, 150.0, 200.0, 250.0, 300.0, 350.0],
            vec![1.0; 6],
        )
        .unwrap();
        let fill = SolarReferenceSpectrum::new(vec![180.0, 220.0, 260.0, 300.0], vec![5.0; 4]).unwrap();

        let spliced = base.splice(&fill, 180.5, 309.5).unwrap();
        assert_eq!(spliced.wavelengths(), &[100.0, 150.0, 220.0, 260.0, 300.0, 350.0]);
        assert_eq!(spliced.irradiance(), &[1.0, 1.0, 5.0, 5.0, 5.0, 1.0]);
    }

    #[test]
    fn test_channel_round_trip() {
        let channel: Channel = "MUV".parse().unwrap();
        assert_eq!(channel, Channel::Muv);
        assert_eq!(channel.to_string(), "muv");
        assert!("xuv".parse::<Channel>().is_err());
    }
}
