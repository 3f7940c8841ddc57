//! Weighted least-squares decomposition of nightside spectra into emission
//! templates.
//!
//! Every pixel spectrum is modelled as a constant plus a linear combination of
//! the templates in a [`TemplateLibrary`]. Samples are weighted by the inverse
//! variance of their counts; NaN samples (untransmitted bins, saturated
//! samples) are dropped from the fit. The fitted coefficients are turned into
//! brightnesses by integrating each scaled template through the calibration
//! curve.

use crate::core::templates::{TemplateLibrary, AURORAL_TEMPLATES, NO_NIGHTGLOW};
use crate::types::{IuvsError, IuvsResult};
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, ArrayView1};
use std::collections::BTreeMap;

/// Name under which the constant term is reported
pub const CONSTANT_TERM: &str = "constant";

/// Why a pixel could not be fitted
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitFailure {
    #[error("no sample has a usable uncertainty")]
    NoValidUncertainty,

    #[error("{valid} valid samples for {parameters} parameters")]
    TooFewSamples { valid: usize, parameters: usize },

    #[error("design matrix is singular")]
    SingularDesignMatrix,
}

/// Fitted decomposition of one pixel
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    /// Fitted coefficient of every template and of the constant term
    pub coefficients: BTreeMap<String, f64>,
    /// One-sigma uncertainty of every coefficient
    pub standard_errors: BTreeMap<String, f64>,
    /// Data minus model on the fit grid, NaN where a sample was excluded
    pub residuals: Array1<f64>,
    /// Integrated brightness of every template [kR]
    pub brightness: BTreeMap<String, f64>,
    /// One-sigma uncertainty of every brightness [kR]
    pub brightness_uncertainty: BTreeMap<String, f64>,
    /// Number of samples that entered the fit
    pub n_samples: usize,
}

impl FitResult {
    /// Summed brightness of the auroral templates present in the fit [kR]
    pub fn aurora_brightness(&self) -> f64 {
        sum_present(&self.brightness, &AURORAL_TEMPLATES)
    }

    /// Uncertainty of [`FitResult::aurora_brightness`], the linear sum of the
    /// individual uncertainties [kR]
    pub fn aurora_uncertainty(&self) -> f64 {
        sum_present(&self.brightness_uncertainty, &AURORAL_TEMPLATES)
    }

    /// Brightness of the NO nightglow template, NaN when it was not fitted
    pub fn no_nightglow_brightness(&self) -> f64 {
        self.brightness.get(NO_NIGHTGLOW).copied().unwrap_or(f64::NAN)
    }

    pub fn no_nightglow_uncertainty(&self) -> f64 {
        self.brightness_uncertainty.get(NO_NIGHTGLOW).copied().unwrap_or(f64::NAN)
    }
}

fn sum_present(values: &BTreeMap<String, f64>, names: &[&str]) -> f64 {
    let present: Vec<f64> = names.iter().filter_map(|&n| values.get(n).copied()).collect();
    if present.is_empty() {
        f64::NAN
    } else {
        present.iter().sum()
    }
}

/// Outcome of fitting one pixel
#[derive(Debug, Clone, PartialEq)]
pub enum PixelFit {
    Fitted(FitResult),
    FitFailed(FitFailure),
}

impl PixelFit {
    pub fn is_fitted(&self) -> bool {
        matches!(self, PixelFit::Fitted(_))
    }

    pub fn result(&self) -> Option<&FitResult> {
        match self {
            PixelFit::Fitted(result) => Some(result),
            PixelFit::FitFailed(_) => None,
        }
    }
}

/// Fits a fixed template library to spectra on a fixed spectral grid
#[derive(Debug, Clone)]
pub struct NightsideTemplateFitter {
    names: Vec<String>,
    /// Constant column followed by one column per template
    design: DMatrix<f64>,
    /// `wavelength_width / calibration_curve` on the fit grid [kR/DN], zero
    /// where the curve is not positive
    brightness_weights: Array1<f64>,
}

impl NightsideTemplateFitter {
    /// Prepare a fitter.
    ///
    /// `templates` and `calibration_curve` [DN/kR] must both be tabulated on
    /// the grid the spectra will be given on.
    pub fn new(templates: &TemplateLibrary, calibration_curve: ArrayView1<f64>, wavelength_width: f64) -> IuvsResult<Self> {
        let n_bins = templates
            .spectral_len()
            .ok_or_else(|| IuvsError::Config("No templates to fit".to_string()))?;
        if calibration_curve.len() != n_bins {
            return Err(IuvsError::ShapeMismatch(format!(
                "Calibration curve has {} bins, templates have {}",
                calibration_curve.len(),
                n_bins
            )));
        }

        let n_params = templates.len() + 1;
        let mut design = DMatrix::<f64>::zeros(n_bins, n_params);
        for row in 0..n_bins {
            design[(row, 0)] = 1.0;
        }
        for (col, (_, template)) in templates.iter().enumerate() {
            for (row, &value) in template.iter().enumerate() {
                design[(row, col + 1)] = value;
            }
        }

        let names = std::iter::once(CONSTANT_TERM.to_string())
            .chain(templates.names().into_iter().map(String::from))
            .collect();
        // Bins with no sensitivity contribute nothing to the brightness
        let brightness_weights =
            calibration_curve.mapv(|c| if c.is_finite() && c > 0.0 { wavelength_width / c } else { 0.0 });

        log::debug!(
            "Template fitter with {} parameters on {} spectral bins",
            n_params,
            n_bins
        );

        Ok(Self {
            names,
            design,
            brightness_weights,
        })
    }

    /// Length of the spectra this fitter accepts
    pub fn n_bins(&self) -> usize {
        self.design.nrows()
    }

    /// Parameter names, constant term first
    pub fn parameter_names(&self) -> &[String] {
        &self.names
    }

    /// Fit one spectrum given its one-sigma uncertainty, both in DN
    pub fn fit(&self, spectrum: ArrayView1<f64>, uncertainty: ArrayView1<f64>) -> IuvsResult<PixelFit> {
        if spectrum.len() != self.n_bins() || uncertainty.len() != self.n_bins() {
            return Err(IuvsError::ShapeMismatch(format!(
                "Spectrum ({}) and uncertainty ({}) must have {} bins",
                spectrum.len(),
                uncertainty.len(),
                self.n_bins()
            )));
        }

        Ok(match self.solve(spectrum, uncertainty) {
            Ok(result) => PixelFit::Fitted(result),
            Err(failure) => PixelFit::FitFailed(failure),
        })
    }

    fn solve(&self, spectrum: ArrayView1<f64>, uncertainty: ArrayView1<f64>) -> Result<FitResult, FitFailure> {
        if !uncertainty.iter().any(|s| s.is_finite() && *s > 0.0) {
            return Err(FitFailure::NoValidUncertainty);
        }

        let n_params = self.design.ncols();
        let rows: Vec<usize> = (0..self.n_bins())
            .filter(|&i| {
                let sigma = uncertainty[i];
                spectrum[i].is_finite()
                    && sigma.is_finite()
                    && sigma > 0.0
                    && self.design.row(i).iter().all(|v| v.is_finite())
            })
            .collect();
        let n = rows.len();
        if n < n_params {
            return Err(FitFailure::TooFewSamples {
                valid: n,
                parameters: n_params,
            });
        }

        // Whitened system: each row scaled by 1/sigma
        let mut x_w = DMatrix::<f64>::zeros(n, n_params);
        let mut y_w = DVector::<f64>::zeros(n);
        for (k, &i) in rows.iter().enumerate() {
            let inv_sigma = 1.0 / uncertainty[i];
            for j in 0..n_params {
                x_w[(k, j)] = self.design[(i, j)] * inv_sigma;
            }
            y_w[k] = spectrum[i] * inv_sigma;
        }

        let svd = x_w.clone().svd(true, true);
        let singular = &svd.singular_values;
        let max_sv = singular.iter().copied().fold(0.0_f64, f64::max);
        let min_sv = singular.iter().copied().fold(f64::INFINITY, f64::min);
        let tolerance = max_sv * n.max(n_params) as f64 * f64::EPSILON;
        if max_sv <= 0.0 || min_sv <= tolerance {
            return Err(FitFailure::SingularDesignMatrix);
        }

        let beta = svd
            .solve(&y_w, tolerance)
            .map_err(|_| FitFailure::SingularDesignMatrix)?;
        let v_t = svd.v_t.as_ref().ok_or(FitFailure::SingularDesignMatrix)?;

        let weighted_residuals = &y_w - &x_w * &beta;
        let scale = if n > n_params {
            weighted_residuals.norm_squared() / (n - n_params) as f64
        } else {
            f64::NAN
        };
        let standard_errors: Vec<f64> = (0..n_params)
            .map(|j| {
                let variance: f64 = (0..n_params).map(|k| (v_t[(k, j)] / singular[k]).powi(2)).sum();
                (scale * variance).sqrt()
            })
            .collect();

        let model = &self.design * &beta;
        let mut residuals = Array1::from_elem(self.n_bins(), f64::NAN);
        for &i in &rows {
            residuals[i] = spectrum[i] - model[i];
        }

        let mut coefficients = BTreeMap::new();
        let mut errors = BTreeMap::new();
        let mut brightness = BTreeMap::new();
        let mut brightness_uncertainty = BTreeMap::new();
        for (j, name) in self.names.iter().enumerate() {
            coefficients.insert(name.clone(), beta[j]);
            errors.insert(name.clone(), standard_errors[j]);
            if j == 0 {
                continue;
            }
            let integrated = self.integrated_template(j);
            brightness.insert(name.clone(), beta[j] * integrated);
            brightness_uncertainty.insert(name.clone(), standard_errors[j] * integrated);
        }

        Ok(FitResult {
            coefficients,
            standard_errors: errors,
            residuals,
            brightness,
            brightness_uncertainty,
            n_samples: n,
        })
    }

    /// Sum over the grid of template column `column` converted to kR
    fn integrated_template(&self, column: usize) -> f64 {
        self.design
            .column(column)
            .iter()
            .zip(self.brightness_weights.iter())
            .map(|(t, w)| t * w)
            .sum()
    }
}
