//! Interpolation, quadrature and convolution kernels shared by the calibration
//! components.

use num_traits::Float;

/// Piecewise-linear interpolation of `(xp, fp)` at `x`.
///
/// `xp` must be increasing. Queries outside the tabulated range return the
/// nearest edge value. A NaN query or an empty table returns NaN.
pub fn interp<T: Float>(x: T, xp: &[T], fp: &[T]) -> T {
    let n = xp.len().min(fp.len());
    if n == 0 || x.is_nan() {
        return T::nan();
    }
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }

    // First index with xp > x; guaranteed to be in 1..n by the checks above
    let upper = xp[..n].partition_point(|&v| v <= x);
    let lower = upper - 1;

    let span = xp[upper] - xp[lower];
    if span <= T::zero() {
        return fp[lower];
    }
    let weight = (x - xp[lower]) / span;
    fp[lower] * (T::one() - weight) + fp[upper] * weight
}

/// `num` evenly spaced values from `start` to `stop` inclusive
pub fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            (0..num).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Outcome of an adaptive quadrature
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadratureEstimate {
    pub value: f64,
    /// Estimated absolute error of `value`
    pub error: f64,
    /// False when the recursion limit was reached before the tolerance
    pub converged: bool,
}

/// Adaptive Simpson integration of `f` over `[low, high]`.
///
/// Intervals are bisected until the Richardson error estimate falls below
/// `tolerance` (absolute) or `max_depth` bisections have been made. Reversed
/// bounds give the negated integral and a zero-width interval integrates to 0.
pub fn adaptive_simpson<F>(f: F, low: f64, high: f64, tolerance: f64, max_depth: u32) -> QuadratureEstimate
where
    F: Fn(f64) -> f64,
{
    if low == high {
        return QuadratureEstimate {
            value: 0.0,
            error: 0.0,
            converged: true,
        };
    }
    if high < low {
        let reversed = adaptive_simpson(f, high, low, tolerance, max_depth);
        return QuadratureEstimate {
            value: -reversed.value,
            ..reversed
        };
    }

    let f_low = f(low);
    let f_high = f(high);
    let mid = 0.5 * (low + high);
    let f_mid = f(mid);
    let whole = simpson(low, high, f_low, f_mid, f_high);

    let mut estimate = QuadratureEstimate {
        value: 0.0,
        error: 0.0,
        converged: true,
    };
    simpson_step(
        &f,
        SimpsonPanel {
            low,
            high,
            f_low,
            f_mid,
            f_high,
            whole,
        },
        tolerance.max(f64::EPSILON),
        max_depth,
        &mut estimate,
    );
    estimate
}

#[derive(Clone, Copy)]
struct SimpsonPanel {
    low: f64,
    high: f64,
    f_low: f64,
    f_mid: f64,
    f_high: f64,
    whole: f64,
}

fn simpson(low: f64, high: f64, f_low: f64, f_mid: f64, f_high: f64) -> f64 {
    (high - low) / 6.0 * (f_low + 4.0 * f_mid + f_high)
}

fn simpson_step<F>(f: &F, panel: SimpsonPanel, tolerance: f64, depth: u32, acc: &mut QuadratureEstimate)
where
    F: Fn(f64) -> f64,
{
    let mid = 0.5 * (panel.low + panel.high);
    let left_mid = 0.5 * (panel.low + mid);
    let right_mid = 0.5 * (mid + panel.high);
    let f_left_mid = f(left_mid);
    let f_right_mid = f(right_mid);

    let left = simpson(panel.low, mid, panel.f_low, f_left_mid, panel.f_mid);
    let right = simpson(mid, panel.high, panel.f_mid, f_right_mid, panel.f_high);
    let delta = left + right - panel.whole;

    if delta.abs() <= 15.0 * tolerance || !delta.is_finite() {
        acc.value += left + right + delta / 15.0;
        acc.error += (delta / 15.0).abs();
        return;
    }
    if depth == 0 {
        acc.value += left + right + delta / 15.0;
        acc.error += (delta / 15.0).abs();
        acc.converged = false;
        return;
    }

    simpson_step(
        f,
        SimpsonPanel {
            low: panel.low,
            high: mid,
            f_low: panel.f_low,
            f_mid: f_left_mid,
            f_high: panel.f_mid,
            whole: left,
        },
        tolerance / 2.0,
        depth - 1,
        acc,
    );
    simpson_step(
        f,
        SimpsonPanel {
            low: mid,
            high: panel.high,
            f_low: panel.f_mid,
            f_mid: f_right_mid,
            f_high: panel.f_high,
            whole: right,
        },
        tolerance / 2.0,
        depth - 1,
        acc,
    );
}

/// Discrete linear convolution returning the central part of the full result,
/// `max(len(signal), len(kernel))` samples long. Samples beyond the ends of the
/// signal are taken as zero.
pub fn convolve_same(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    if signal.is_empty() || kernel.is_empty() {
        return Vec::new();
    }

    let (long, short) = if signal.len() >= kernel.len() {
        (signal, kernel)
    } else {
        (kernel, signal)
    };
    let n = long.len();
    let m = short.len();
    let offset = (m - 1) / 2;

    (0..n)
        .map(|i| {
            // full[k] = sum_j long[k - j] * short[j], with k = i + offset
            let k = i + offset;
            let j_start = k.saturating_sub(n - 1);
            let j_end = k.min(m - 1);
            (j_start..=j_end).map(|j| long[k - j] * short[j]).sum()
        })
        .collect()
}

/// Least-squares straight line `y = slope * x + intercept` through the finite
/// `(x, y)` pairs. `None` with fewer than two points or no spread in `x`.
pub fn linear_fit(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(&a, &b)| (a, b))
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let sxx: f64 = pairs.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    if sxx <= 0.0 {
        return None;
    }
    let sxy: f64 = pairs.iter().map(|p| (p.0 - mean_x) * (p.1 - mean_y)).sum();

    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interp_clamps_at_edges() {
        let xp = [1.0, 2.0, 3.0];
        let fp = [10.0, 20.0, 40.0];
        assert_eq!(interp(0.0, &xp, &fp), 10.0);
        assert_eq!(interp(5.0, &xp, &fp), 40.0);
        assert!((interp(2.5, &xp, &fp) - 30.0).abs() < 1e-12);
        assert_eq!(interp(2.0, &xp, &fp), 20.0);
        assert!(interp(f64::NAN, &xp, &fp).is_nan());
    }

    #[test]
    fn test_linspace() {
        assert_eq!(linspace(0.0, 1.0, 5), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(linspace(3.0, 7.0, 1), vec![3.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn test_simpson_is_exact_for_cubics() {
        let estimate = adaptive_simpson(|x| x * x * x - 2.0 * x, 0.0, 2.0, 1e-10, 20);
        assert!(estimate.converged);
        assert!((estimate.value - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_simpson_handles_kinks_and_reversed_bounds() {
        let f = |x: f64| x.abs();
        let forward = adaptive_simpson(f, -1.0, 3.0, 1e-10, 40);
        assert!((forward.value - 5.0).abs() < 1e-8);

        let backward = adaptive_simpson(f, 3.0, -1.0, 1e-10, 40);
        assert!((backward.value + 5.0).abs() < 1e-8);

        let empty = adaptive_simpson(f, 2.0, 2.0, 1e-10, 40);
        assert_eq!(empty.value, 0.0);
    }

    #[test]
    fn test_simpson_reports_non_convergence() {
        let estimate = adaptive_simpson(|x: f64| (1.0 / x).sin(), 1e-6, 1.0, 1e-14, 3);
        assert!(!estimate.converged);
        assert!(estimate.value.is_finite());
    }

    #[test]
    fn test_convolve_same_matches_centered_full_convolution() {
        let signal = [1.0, 2.0, 3.0, 4.0];
        let kernel = [0.25, 0.5, 0.25];
        let result = convolve_same(&signal, &kernel);
        // full = [0.25, 1.0, 2.0, 3.0, 2.75, 1.0]; centred slice starts at 1
        let expected = [1.0, 2.0, 3.0, 2.75];
        assert_eq!(result.len(), 4);
        for (r, e) in result.iter().zip(expected.iter()) {
            assert!((r - e).abs() < 1e-12);
        }
    }

    #[test]
    fn test_convolve_same_with_delta_is_identity() {
        let signal = [3.0, -1.0, 7.5];
        assert_eq!(convolve_same(&signal, &[1.0]), signal.to_vec());
        assert_eq!(convolve_same(&signal, &[0.0, 1.0, 0.0]), signal.to_vec());
    }

    #[test]
    fn test_linear_fit() {
        let (slope, intercept) = linear_fit(&[0.0, 1.0, 2.0, f64::NAN], &[1.0, 3.0, 5.0, 0.0]).unwrap();
        assert!((slope - 2.0).abs() < 1e-12);
        assert!((intercept - 1.0).abs() < 1e-12);
        assert!(linear_fit(&[1.0, 1.0], &[2.0, 3.0]).is_none());
        assert!(linear_fit(&[1.0], &[2.0]).is_none());
    }
}
