//! Grouping of scanning-mirror integrations into spatial swaths.
//!
//! The mirror steps across the planet in roughly equal increments and then
//! either snaps back to its starting angle or turns around. Each of those
//! events starts a new swath.

use crate::types::{IuvsError, IuvsResult};
use ndarray::{ArrayBase, ArrayView, Axis, Data, Dimension, Slice};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Parameters of the swath segmentation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwathOptions {
    /// A step larger than this multiple of the first step starts a new swath
    #[serde(rename = "thresholdFactor")]
    pub threshold_factor: f64,
    /// Whether a change of scan direction also starts a new swath
    #[serde(rename = "splitOnReversal")]
    pub split_on_reversal: bool,
    /// Smallest backward step, as a fraction of the first step, that counts
    /// as a reversal. Shorter backward steps are treated as jitter.
    #[serde(rename = "reversalFraction")]
    pub reversal_fraction: f64,
}

impl Default for SwathOptions {
    fn default() -> Self {
        Self {
            threshold_factor: 2.0,
            split_on_reversal: true,
            reversal_fraction: 0.5,
        }
    }
}

/// Assigns a swath number to every integration from its mirror angle
#[derive(Debug, Clone, Default)]
pub struct SwathSegmenter {
    options: SwathOptions,
}

impl SwathSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: SwathOptions) -> Self {
        Self { options }
    }

    /// Swath number of each integration.
    ///
    /// The result starts at 0 and never decreases. Fewer than two angles
    /// cannot contain a discontinuity, so they all land in swath 0.
    pub fn segment(&self, mirror_angles: &[f64]) -> Vec<usize> {
        let discontinuities = self.discontinuities(mirror_angles);
        log::debug!(
            "Found {} swath discontinuities in {} integrations",
            discontinuities.len(),
            mirror_angles.len()
        );

        let mut swaths = Vec::with_capacity(mirror_angles.len());
        let mut passed = 0;
        for integration in 0..mirror_angles.len() {
            while passed < discontinuities.len() && discontinuities[passed] <= integration {
                passed += 1;
            }
            swaths.push(passed);
        }
        swaths
    }

    /// Number of swaths in an observation
    pub fn count_swaths(&self, mirror_angles: &[f64]) -> usize {
        if mirror_angles.is_empty() {
            0
        } else {
            self.discontinuities(mirror_angles).len() + 1
        }
    }

    /// Indices of the integrations that start a new swath
    fn discontinuities(&self, mirror_angles: &[f64]) -> Vec<usize> {
        let steps: Vec<f64> = mirror_angles.windows(2).map(|w| w[1] - w[0]).collect();

        let reference = match steps.first() {
            Some(&first) if first != 0.0 && first.is_finite() => first.abs(),
            _ => steps
                .iter()
                .copied()
                .find(|s| *s != 0.0 && s.is_finite())
                .map(f64::abs)
                .unwrap_or(0.0),
        };
        let threshold = self.options.threshold_factor * reference;
        let min_reversal = self.options.reversal_fraction * reference;

        let mut found = Vec::new();
        // Sign of the last step taken inside the current swath, 0 when unknown
        let mut direction = 0.0;

        for (i, &step) in steps.iter().enumerate() {
            if !step.is_finite() {
                continue;
            }
            if step.abs() > threshold {
                found.push(i + 1);
                direction = 0.0;
                continue;
            }
            if step == 0.0 {
                continue;
            }

            let sign = step.signum();
            if direction != 0.0 && sign != direction {
                if step.abs() < min_reversal {
                    continue;
                }
                if self.options.split_on_reversal {
                    found.push(i + 1);
                }
            }
            direction = sign;
        }
        found
    }
}

/// Number of masked integrations in each swath.
///
/// One count per distinct swath number, in increasing order of swath number.
pub fn count_integrations_in_swath(swaths: &[usize], mask: &[bool]) -> IuvsResult<Vec<usize>> {
    if swaths.len() != mask.len() {
        return Err(IuvsError::ShapeMismatch(format!(
            "{} swath numbers but {} mask values",
            swaths.len(),
            mask.len()
        )));
    }

    let mut distinct = swaths.to_vec();
    distinct.sort_unstable();
    distinct.dedup();

    let mut counts = vec![0; distinct.len()];
    for (&swath, _) in swaths.iter().zip(mask).filter(|&(_, &keep)| keep) {
        if let Ok(slot) = distinct.binary_search(&swath) {
            counts[slot] += 1;
        }
    }
    Ok(counts)
}

/// Integration indices belonging to `swath`, or `None` if no integration does
pub fn swath_integration_range(swaths: &[usize], swath: usize) -> Option<Range<usize>> {
    let start = swaths.iter().position(|&s| s == swath)?;
    let end = swaths.iter().rposition(|&s| s == swath)? + 1;
    Some(start..end)
}

/// View of the integrations of `array` (integration axis first) that belong
/// to `swath`
pub fn select_swath<'a, S, D>(
    array: &'a ArrayBase<S, D>,
    swaths: &[usize],
    swath: usize,
) -> IuvsResult<ArrayView<'a, S::Elem, D>>
where
    S: Data,
    D: Dimension,
{
    if array.ndim() == 0 || array.len_of(Axis(0)) != swaths.len() {
        return Err(IuvsError::ShapeMismatch(format!(
            "Array with shape {:?} does not match {} swath numbers",
            array.shape(),
            swaths.len()
        )));
    }

    let range = swath_integration_range(swaths, swath)
        .ok_or_else(|| IuvsError::Processing(format!("Swath {} has no integrations", swath)))?;
    Ok(array.slice_axis(Axis(0), Slice::from(range)))
}
