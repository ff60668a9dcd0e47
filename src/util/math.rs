//! Angle and summary-statistics helpers.

use std::f32::consts::{PI, TAU};

/// Wraps an angle in radians to the range (-pi, pi].
pub(crate) fn wrap_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Signed shortest arc from `from` to `to`, in (-pi, pi].
pub(crate) fn shortest_arc(from: f32, to: f32) -> f32 {
    wrap_angle(to - from)
}

/// Population mean and standard deviation.
pub(crate) fn mean_std(values: &[f32]) -> Option<(f32, f32)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    Some((mean as f32, var.sqrt() as f32))
}

/// Median of a sorted slice; the two middle values are averaged for even lengths.
pub(crate) fn median_sorted(sorted: &[u32]) -> Option<f32> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let mid = n / 2;
    if n % 2 == 1 {
        Some(sorted[mid] as f32)
    } else {
        Some((sorted[mid - 1] as f32 + sorted[mid] as f32) * 0.5)
    }
}
