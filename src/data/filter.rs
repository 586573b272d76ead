use log::warn;

use crate::config::{FilterConfig, FilterKind};

// ---------------------------------------------------------------------------
// Filter engine: stateless smoothing of one channel
// ---------------------------------------------------------------------------

/// Smooth `data` with the configured algorithm.
///
/// Always returns a vector of the same length. Parameters the selected
/// algorithm cannot use (too small a window, too little data) degrade to a
/// copy of the input rather than an error.
pub fn smooth(data: &[f64], config: &FilterConfig) -> Vec<f64> {
    match config.kind {
        FilterKind::MovingAverage => moving_average(data, config.window),
        FilterKind::Median => median_filter(data, config.window),
        FilterKind::SavitzkyGolay => savitzky_golay(data, config.window),
    }
}

/// Even windows grow by one so the window stays centred on the sample.
fn odd_window(window: usize) -> usize {
    if window % 2 == 0 {
        window + 1
    } else {
        window
    }
}

/// Centred mean. Near the ends the window is clipped to the array, so fewer
/// terms enter the average there (no padding).
pub fn moving_average(data: &[f64], window: usize) -> Vec<f64> {
    let window = odd_window(window);
    if window < 3 || data.is_empty() {
        return data.to_vec();
    }

    let half = window / 2;
    let last = data.len() - 1;
    (0..data.len())
        .map(|i| {
            let span = &data[i.saturating_sub(half)..=(i + half).min(last)];
            span.iter().sum::<f64>() / span.len() as f64
        })
        .collect()
}

/// Centred running median with edge replication: out-of-range indices are
/// clamped to the first/last sample.
///
/// A window too large to index or buffer returns the input unchanged.
pub fn median_filter(data: &[f64], window: usize) -> Vec<f64> {
    let window = odd_window(window);
    if window < 3 || data.is_empty() || data.len().checked_add(window).is_none() {
        return data.to_vec();
    }

    let half = window / 2;
    let last = data.len() - 1;
    let mut scratch = Vec::new();
    if scratch.try_reserve_exact(window).is_err() {
        warn!("median window {window} cannot be buffered, returning input unchanged");
        return data.to_vec();
    }
    (0..data.len())
        .map(|i| {
            scratch.clear();
            scratch.extend((i..i + window).map(|j| data[j.saturating_sub(half).min(last)]));
            // NaN sorts after every number
            scratch.sort_by(f64::total_cmp);
            scratch[half]
        })
        .collect()
}

// -- Savitzky-Golay --

// Smoothing (0th derivative) kernels for a cubic fit.
const SG_KERNEL_5: [f64; 5] = [-3.0, 12.0, 17.0, 12.0, -3.0];
const SG_NORM_5: f64 = 35.0;
const SG_KERNEL_7: [f64; 7] = [-2.0, 3.0, 6.0, 7.0, 6.0, 3.0, -2.0];
const SG_NORM_7: f64 = 21.0;
const SG_KERNEL_11: [f64; 11] = [
    -36.0, 9.0, 44.0, 69.0, 84.0, 89.0, 84.0, 69.0, 44.0, 9.0, -36.0,
];
const SG_NORM_11: f64 = 429.0;

/// Kernel used for an (odd) requested window. Anything from 9 upwards is
/// served by the 11-point kernel; wider true kernels are not computed.
fn savitzky_golay_kernel(window: usize) -> Option<(&'static [f64], f64)> {
    match window {
        5 => Some((&SG_KERNEL_5, SG_NORM_5)),
        7 => Some((&SG_KERNEL_7, SG_NORM_7)),
        w if w >= 9 => Some((&SG_KERNEL_11, SG_NORM_11)),
        _ => None,
    }
}

/// Fixed-coefficient Savitzky-Golay smoothing (cubic, 0th derivative).
///
/// Interior samples are convolved with the kernel using reflected indices.
/// The first and last `kernel_len / 2` samples are then copied back from the
/// input unfiltered. Input shorter than the requested window is returned as is.
pub fn savitzky_golay(data: &[f64], window: usize) -> Vec<f64> {
    let window = odd_window(window);
    if window < 5 || data.len() < window {
        return data.to_vec();
    }
    let Some((kernel, norm)) = savitzky_golay_kernel(window) else {
        return data.to_vec();
    };

    let n = data.len() as isize;
    let half = kernel.len() / 2;
    let mut smoothed: Vec<f64> = (0..n)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, coeff)| {
                    let mut idx = i + k as isize - half as isize;
                    if idx < 0 {
                        idx = -idx;
                    }
                    if idx >= n {
                        idx = 2 * (n - 1) - idx;
                    }
                    coeff * data[idx.clamp(0, n - 1) as usize]
                })
                .sum::<f64>()
                / norm
        })
        .collect();

    let head = half.min(data.len());
    let tail = data.len().saturating_sub(half);
    smoothed[..head].copy_from_slice(&data[..head]);
    smoothed[tail..].copy_from_slice(&data[tail..]);
    smoothed
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ramp(n: usize) -> Vec<f64> {
        (0..n).map(|i| -150.0 + 0.7 * i as f64 + ((i * 7) % 5) as f64).collect()
    }

    #[test]
    fn constant_input_is_unchanged() {
        let data = vec![-120.0; 17];
        for window in [3, 4, 11, 21, 51] {
            assert_eq!(moving_average(&data, window), data);
            assert_eq!(median_filter(&data, window), data);
        }
    }

    #[test]
    fn small_window_or_empty_input_is_identity() {
        let data = ramp(10);
        for window in [0, 1] {
            assert_eq!(moving_average(&data, window), data);
            assert_eq!(median_filter(&data, window), data);
        }
        assert!(moving_average(&[], 5).is_empty());
        assert!(median_filter(&[], 5).is_empty());
        assert!(savitzky_golay(&[], 5).is_empty());
    }

    #[test]
    fn even_window_behaves_like_next_odd_window() {
        let data = ramp(25);
        assert_eq!(moving_average(&data, 4), moving_average(&data, 5));
        assert_eq!(median_filter(&data, 10), median_filter(&data, 11));
        assert_eq!(savitzky_golay(&data, 6), savitzky_golay(&data, 7));
    }

    #[test]
    fn moving_average_truncates_at_edges() {
        let out = moving_average(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_abs_diff_eq!(out[0], 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(out[2], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[4], 4.5, epsilon = 1e-12);
    }

    #[test]
    fn moving_average_is_linear() {
        let data = ramp(30);
        let base = moving_average(&data, 7);
        let scaled: Vec<f64> = data.iter().map(|v| 2.5 * v - 3.0).collect();
        let out = moving_average(&scaled, 7);
        for (o, b) in out.iter().zip(&base) {
            assert_abs_diff_eq!(*o, 2.5 * b - 3.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn unbufferable_median_window_returns_input() {
        let data = [-100.0, -100.0, -80.0, -100.0];
        assert_eq!(median_filter(&data, usize::MAX), data);
        assert_eq!(median_filter(&data, usize::MAX - 1), data);
        assert_eq!(median_filter(&data, usize::MAX / 4), data);
    }

    #[test]
    fn median_removes_single_outlier() {
        let out = median_filter(&[1.0, 1.0, 1.0, 9.0, 1.0, 1.0, 1.0], 3);
        assert!(!out.contains(&9.0));
        assert_eq!(out, vec![1.0; 7]);
    }

    #[test]
    fn median_replicates_edges() {
        // window at index 0 is [5, 5, 1]
        let out = median_filter(&[5.0, 1.0, 1.0], 3);
        assert_eq!(out, vec![5.0, 1.0, 1.0]);
    }

    #[test]
    fn savitzky_golay_keeps_boundary_samples() {
        let data = ramp(40);
        for (window, half) in [(5, 2), (7, 3), (11, 5), (21, 5), (51, 5)] {
            let out = savitzky_golay(&data, window);
            assert_eq!(out.len(), data.len());
            assert_eq!(&out[..half], &data[..half]);
            assert_eq!(&out[data.len() - half..], &data[data.len() - half..]);
        }
    }

    #[test]
    fn savitzky_golay_preserves_quadratics_in_the_interior() {
        let data: Vec<f64> = (0..30).map(|i| 0.05 * (i * i) as f64 - 2.0 * i as f64).collect();
        for window in [5, 7, 11] {
            let out = savitzky_golay(&data, window);
            for (o, d) in out.iter().zip(&data) {
                assert_abs_diff_eq!(*o, *d, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn savitzky_golay_wide_windows_snap_to_eleven_points() {
        let data = ramp(60);
        let eleven = savitzky_golay(&data, 11);
        assert_eq!(savitzky_golay(&data, 9), eleven);
        assert_eq!(savitzky_golay(&data, 35), eleven);
        assert_eq!(savitzky_golay(&data, 51), eleven);
    }

    #[test]
    fn savitzky_golay_degrades_to_identity() {
        let data = ramp(8);
        assert_eq!(savitzky_golay(&data, 3), data);
        // shorter than the requested window
        assert_eq!(savitzky_golay(&data, 11), data);
    }

    #[test]
    fn smooth_dispatches_on_kind() {
        let data = ramp(20);
        let cfg = |kind| FilterConfig { kind, window: 5 };
        assert_eq!(smooth(&data, &cfg(FilterKind::MovingAverage)), moving_average(&data, 5));
        assert_eq!(smooth(&data, &cfg(FilterKind::Median)), median_filter(&data, 5));
        assert_eq!(smooth(&data, &cfg(FilterKind::SavitzkyGolay)), savitzky_golay(&data, 5));
    }
}
