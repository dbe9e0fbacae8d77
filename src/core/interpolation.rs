//! One-dimensional interpolation primitives shared by georeferencing,
//! height correction and trajectory matching.

use crate::types::HampError;
use ndarray::{Array1, ArrayView1};
use num_traits::Float;
use serde::{Deserialize, Serialize};

/// How a channel sampled on one clock is carried onto another clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentMethod {
    /// Value of the closest source sample (earlier sample wins ties)
    Nearest,
    /// Linear interpolation between the bracketing source samples
    #[default]
    Linear,
}

impl std::str::FromStr for AlignmentMethod {
    type Err = HampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nearest" => Ok(AlignmentMethod::Nearest),
            "linear" => Ok(AlignmentMethod::Linear),
            other => Err(HampError::Configuration(format!("unknown alignment method '{}'", other))),
        }
    }
}

/// Index of the sample in `sorted` closest to `target`
pub fn nearest_index(sorted: &[f64], target: f64) -> Option<usize> {
    if sorted.is_empty() || !target.is_finite() {
        return None;
    }
    let right = sorted.partition_point(|&s| s < target);
    if right == 0 {
        return Some(0);
    }
    if right == sorted.len() {
        return Some(sorted.len() - 1);
    }
    let left = right - 1;
    if (target - sorted[left]) <= (sorted[right] - target) {
        Some(left)
    } else {
        Some(right)
    }
}

/// Bracketing pair `(i, i + 1)` and weight of the upper sample, or the exact
/// index with weight zero. `None` outside the covered range.
fn bracket(sorted: &[f64], target: f64) -> Option<(usize, usize, f64)> {
    let n = sorted.len();
    if n == 0 || !target.is_finite() || target < sorted[0] || target > sorted[n - 1] {
        return None;
    }
    let upper = sorted.partition_point(|&s| s <= target);
    let lower = upper - 1;
    if sorted[lower] == target || upper == n {
        return Some((lower, lower, 0.0));
    }
    let weight = (target - sorted[lower]) / (sorted[upper] - sorted[lower]);
    Some((lower, upper, weight))
}

/// Carry `values` sampled at `source_time` onto `target_time`.
///
/// Never extrapolates: targets outside the source range are missing, as are
/// targets whose bracketing source samples are more than `max_gap` seconds
/// apart.
pub fn align_to(
    source_time: ArrayView1<f64>,
    values: ArrayView1<f64>,
    target_time: ArrayView1<f64>,
    method: AlignmentMethod,
    max_gap: Option<f64>,
) -> Array1<f64> {
    align_with(source_time, values, target_time, method, max_gap, None)
}

/// Like [`align_to`] for angles that wrap with `period` (longitude, heading)
pub fn align_periodic(
    source_time: ArrayView1<f64>,
    values: ArrayView1<f64>,
    target_time: ArrayView1<f64>,
    method: AlignmentMethod,
    max_gap: Option<f64>,
    period: f64,
) -> Array1<f64> {
    align_with(source_time, values, target_time, method, max_gap, Some(period))
}

fn align_with(
    source_time: ArrayView1<f64>,
    values: ArrayView1<f64>,
    target_time: ArrayView1<f64>,
    method: AlignmentMethod,
    max_gap: Option<f64>,
    period: Option<f64>,
) -> Array1<f64> {
    let source = source_time.to_vec();
    target_time.mapv(|t| {
        let (lower, upper, weight) = match bracket(&source, t) {
            Some(b) => b,
            None => return f64::NAN,
        };
        if let Some(gap) = max_gap {
            if source[upper] - source[lower] > gap {
                return f64::NAN;
            }
        }
        if lower == upper {
            return values[lower];
        }
        match method {
            AlignmentMethod::Nearest => {
                if weight <= 0.5 {
                    values[lower]
                } else {
                    values[upper]
                }
            }
            AlignmentMethod::Linear => match period {
                Some(p) => lerp_periodic(values[lower], values[upper], weight, p),
                None => values[lower] * (1.0 - weight) + values[upper] * weight,
            },
        }
    })
}

/// Interpolate along the shorter arc and wrap back into `[-p/2, p/2)`
fn lerp_periodic(a: f64, b: f64, weight: f64, period: f64) -> f64 {
    let half = period / 2.0;
    let delta = (b - a + half).rem_euclid(period) - half;
    (a + delta * weight + half).rem_euclid(period) - half
}

/// Linear interpolation of `y(x)` onto `x_new` with linear extrapolation
/// beyond both ends.
///
/// `x` must be strictly increasing. Missing `y` values propagate to any
/// output that depends on them; grid points that coincide with a sample
/// take its value directly. Fewer than two samples yield all-missing output.
pub fn interp1d_extrapolate<F: Float>(x: &[F], y: &[F], x_new: &[F], out: &mut [F]) {
    let n = x.len().min(y.len());
    if n < 2 {
        out.iter_mut().for_each(|v| *v = F::nan());
        return;
    }
    for (target, slot) in x_new.iter().zip(out.iter_mut()) {
        let upper = x[..n].partition_point(|&s| s <= *target);
        if upper > 0 && x[upper - 1] == *target {
            *slot = y[upper - 1];
            continue;
        }
        let (i, k) = if upper == 0 {
            (0, 1)
        } else if upper >= n {
            (n - 2, n - 1)
        } else {
            (upper - 1, upper)
        };
        let slope = (y[k] - y[i]) / (x[k] - x[i]);
        *slot = y[i] + slope * (*target - x[i]);
    }
}

/// Mean of `values` in consecutive bins of `interval` seconds anchored at
/// the first sample. Returns bin start times and bin means; empty bins are
/// missing.
pub fn resample_mean(
    time: ArrayView1<f64>,
    values: ArrayView1<f64>,
    interval: f64,
) -> (Array1<f64>, Array1<f64>) {
    if time.is_empty() || !(interval > 0.0) {
        return (Array1::zeros(0), Array1::zeros(0));
    }
    let origin = time[0];
    let last = time[time.len() - 1];
    let bins = ((last - origin) / interval).floor() as usize + 1;
    let mut sums = vec![0.0; bins];
    let mut counts = vec![0usize; bins];
    for (&t, &v) in time.iter().zip(values.iter()) {
        if !v.is_finite() {
            continue;
        }
        let bin = ((t - origin) / interval).floor() as usize;
        if bin < bins {
            sums[bin] += v;
            counts[bin] += 1;
        }
    }
    let starts = Array1::from_iter((0..bins).map(|b| origin + b as f64 * interval));
    let means = Array1::from_iter(sums.iter().zip(&counts).map(|(&s, &c)| {
        if c > 0 {
            s / c as f64
        } else {
            f64::NAN
        }
    }));
    (starts, means)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_alignment_method_parsing() {
        assert_eq!("Nearest".parse::<AlignmentMethod>().unwrap(), AlignmentMethod::Nearest);
        assert_eq!(" linear".parse::<AlignmentMethod>().unwrap(), AlignmentMethod::Linear);
        assert!(matches!(
            "cubic".parse::<AlignmentMethod>(),
            Err(HampError::Configuration(_))
        ));
    }

    #[test]
    fn test_nearest_index_prefers_earlier_on_tie() {
        let s = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(nearest_index(&s, 1.5), Some(1));
        assert_eq!(nearest_index(&s, 1.6), Some(2));
        assert_eq!(nearest_index(&s, -5.0), Some(0));
        assert_eq!(nearest_index(&s, 99.0), Some(3));
        assert_eq!(nearest_index(&[], 1.0), None);
    }

    #[test]
    fn test_align_linear_never_extrapolates() {
        let src = array![10.0, 11.0, 12.0];
        let vals = array![0.0, 10.0, 20.0];
        let target = array![9.0, 10.5, 12.0, 12.5];
        let out = align_to(src.view(), vals.view(), target.view(), AlignmentMethod::Linear, None);
        assert!(out[0].is_nan());
        assert_abs_diff_eq!(out[1], 5.0);
        assert_abs_diff_eq!(out[2], 20.0);
        assert!(out[3].is_nan());
    }

    #[test]
    fn test_align_respects_gap_limit() {
        let src = array![0.0, 1.0, 10.0];
        let vals = array![1.0, 2.0, 3.0];
        let target = array![0.5, 5.0];
        let out = align_to(src.view(), vals.view(), target.view(), AlignmentMethod::Nearest, Some(2.0));
        assert_abs_diff_eq!(out[0], 1.0);
        assert!(out[1].is_nan());
    }

    #[test]
    fn test_periodic_alignment_crosses_dateline() {
        let src = array![0.0, 2.0];
        let lon = array![179.0, -179.0];
        let target = array![1.0];
        let out = align_periodic(src.view(), lon.view(), target.view(), AlignmentMethod::Linear, None, 360.0);
        assert_abs_diff_eq!(out[0].abs(), 180.0, epsilon = 1e-9);
    }

    #[test]
    fn test_interp1d_extrapolates_linearly() {
        let x = [0.0, 10.0, 20.0];
        let y = [0.0, 1.0, 3.0];
        let grid = [-10.0, 5.0, 20.0, 30.0];
        let mut out = [0.0; 4];
        interp1d_extrapolate(&x, &y, &grid, &mut out);
        assert_abs_diff_eq!(out[0], -1.0);
        assert_abs_diff_eq!(out[1], 0.5);
        assert_abs_diff_eq!(out[2], 3.0);
        assert_abs_diff_eq!(out[3], 5.0);
    }

    #[test]
    fn test_interp1d_propagates_missing_values() {
        let x = [0.0, 10.0, 20.0];
        let y = [1.0, f64::NAN, 3.0];
        let grid = [0.0, 5.0, 15.0];
        let mut out = [0.0; 3];
        interp1d_extrapolate(&x, &y, &grid, &mut out);
        assert_abs_diff_eq!(out[0], 1.0);
        assert!(out[1].is_nan());
        assert!(out[2].is_nan());
    }

    #[test]
    fn test_resample_mean_anchors_at_first_sample() {
        let t = array![100.2, 100.7, 101.3, 103.25];
        let v = array![1.0, 3.0, 5.0, 7.0];
        let (starts, means) = resample_mean(t.view(), v.view(), 1.0);
        assert_eq!(starts.len(), 4);
        assert_abs_diff_eq!(starts[0], 100.2);
        assert_abs_diff_eq!(means[0], 2.0);
        assert_abs_diff_eq!(means[1], 5.0);
        assert!(means[2].is_nan());
        assert_abs_diff_eq!(means[3], 7.0);
    }
}
