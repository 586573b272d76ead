//! Reference-driven spur removal.
//!
//! Spurs show up as narrow peaks in the reference channel. Wherever the
//! reference flags one, the measured curve is bridged by a straight line
//! (in linear frequency) between the nearest clean samples. Two detectors run
//! one after the other:
//!
//! 1. **Baseline**: samples whose reference exceeds its running median by more
//!    than the threshold are spurs; each contiguous run is interpolated between
//!    its clean neighbours.
//! 2. **Edges**: a sample-to-sample jump up by more than the threshold opens a
//!    region that the next jump down closes; the region is interpolated on the
//!    output of pass 1. A jump up that is never closed holds the last clean
//!    value up to the end of the curve.

use log::{debug, warn};

use super::filter::median_filter;
use super::interpolate::linear_interpolate;
use crate::config::SpurConfig;

/// Anchors closer than this in frequency are treated as one point.
const MIN_ANCHOR_SPACING_HZ: f64 = 1e-9;

/// Outcome of one spur-removal run.
#[derive(Debug, Clone, PartialEq)]
pub struct SpurRemoval {
    /// Measured curve with spur regions bridged.
    pub measured: Vec<f64>,
    /// Samples rewritten by the baseline pass.
    pub baseline_replaced: usize,
    /// Samples rewritten by the edge pass.
    pub edge_replaced: usize,
    /// Distinct samples rewritten by either pass.
    pub samples_replaced: usize,
}

impl SpurRemoval {
    fn unchanged(measured: &[f64]) -> Self {
        Self {
            measured: measured.to_vec(),
            baseline_replaced: 0,
            edge_replaced: 0,
            samples_replaced: 0,
        }
    }

    /// Distinct samples rewritten; one bridged by both passes counts once.
    pub fn total_replaced(&self) -> usize {
        self.samples_replaced
    }
}

/// Remove spurs from `measured` using `reference`.
///
/// `measured` and `reference` are the source channels (raw or filtered, the
/// caller decides) and are never a previous spur-removal result. Without a
/// reference, or with fewer than three samples, `measured` comes back as is.
pub fn remove_spurs(
    measured: &[f64],
    reference: Option<&[f64]>,
    frequency: &[f64],
    config: &SpurConfig,
) -> Vec<f64> {
    remove_spurs_with_report(measured, reference, frequency, config).measured
}

/// [`remove_spurs`], also reporting how many samples each pass rewrote.
pub fn remove_spurs_with_report(
    measured: &[f64],
    reference: Option<&[f64]>,
    frequency: &[f64],
    config: &SpurConfig,
) -> SpurRemoval {
    let Some(reference) = reference else {
        return SpurRemoval::unchanged(measured);
    };
    let n = measured.len();
    if reference.len() != n || frequency.len() != n {
        warn!(
            "spur removal skipped: channel lengths differ (measured {n}, reference {}, frequency {})",
            reference.len(),
            frequency.len()
        );
        return SpurRemoval::unchanged(measured);
    }
    if n < 3 {
        return SpurRemoval::unchanged(measured);
    }

    let mut processed = measured.to_vec();
    let mut rewritten = vec![false; n];

    let is_spur = detect_spur_mask(reference, config);
    let baseline_replaced = bridge_spur_runs(&mut processed, frequency, &is_spur, &mut rewritten);

    let edge_replaced = bridge_reference_edges(
        &mut processed,
        frequency,
        reference,
        config.threshold_db,
        &mut rewritten,
    );
    let samples_replaced = rewritten.iter().filter(|&&r| r).count();

    debug!("spur removal: {baseline_replaced} samples from baseline pass, {edge_replaced} from edge pass");

    SpurRemoval {
        measured: processed,
        baseline_replaced,
        edge_replaced,
        samples_replaced,
    }
}

/// Pass-1 classification: `reference - median(reference) > threshold`.
/// Samples where either value is NaN are never spurs.
pub fn detect_spur_mask(reference: &[f64], config: &SpurConfig) -> Vec<bool> {
    let baseline = median_filter(reference, config.baseline_window);
    reference
        .iter()
        .zip(&baseline)
        .map(|(&r, &b)| !r.is_nan() && !b.is_nan() && r - b > config.threshold_db)
        .collect()
}

/// Interpolate every maximal run of flagged samples between the nearest
/// unflagged neighbours. Returns the number of samples rewritten.
fn bridge_spur_runs(
    processed: &mut [f64],
    frequency: &[f64],
    is_spur: &[bool],
    rewritten: &mut [bool],
) -> usize {
    let n = processed.len();
    let mut replaced = 0;
    let mut i = 0;

    while i < n {
        if !is_spur[i] {
            i += 1;
            continue;
        }
        let start = i;
        while i < n && is_spur[i] {
            i += 1;
        }
        let end = i - 1;

        let left = (0..start).rev().find(|&k| !is_spur[k]).unwrap_or(0);
        let right = (end + 1..n).find(|&k| !is_spur[k]).unwrap_or(n - 1);

        let (x1, y1) = (frequency[left], processed[left]);
        let (x2, y2) = (frequency[right], processed[right]);
        let can_interpolate = right > left && (x2 - x1).abs() > MIN_ANCHOR_SPACING_HZ;

        for j in start..=end {
            processed[j] = if can_interpolate {
                linear_interpolate(x1, y1, x2, y2, frequency[j])
            } else {
                y1
            };
        }
        rewritten[start..=end].fill(true);
        replaced += end - start + 1;
    }

    replaced
}

/// Pass 2: bridge regions opened by a rising reference edge and closed by the
/// next falling edge. Returns the number of samples rewritten.
fn bridge_reference_edges(
    processed: &mut [f64],
    frequency: &[f64],
    reference: &[f64],
    threshold_db: f64,
    rewritten: &mut [bool],
) -> usize {
    let n = processed.len();
    let step = |from: usize, to: usize| {
        let (a, b) = (reference[from], reference[to]);
        if a.is_nan() || b.is_nan() {
            None
        } else {
            Some(b - a)
        }
    };
    let rising = |i: usize| step(i - 1, i).is_some_and(|d| d > threshold_db);
    let falling = |j: usize| step(j, j - 1).is_some_and(|d| d > threshold_db);

    let mut replaced = 0;
    let mut i = 1;
    while i + 1 < n {
        if !rising(i) {
            i += 1;
            continue;
        }
        let start = i;
        let (x1, y1) = (frequency[start - 1], processed[start - 1]);

        match (start + 1..n).find(|&j| falling(j)) {
            Some(j) => {
                let (x2, y2) = (frequency[j], processed[j]);
                let can_interpolate = (x2 - x1).abs() > MIN_ANCHOR_SPACING_HZ;
                for k in start..j {
                    processed[k] = if can_interpolate {
                        linear_interpolate(x1, y1, x2, y2, frequency[k])
                    } else {
                        y1
                    };
                }
                rewritten[start..j].fill(true);
                replaced += j - start;
                i = j;
            }
            None => {
                // unmatched rising edge: hold the last clean value to the end
                processed[start..].fill(y1);
                rewritten[start..].fill(true);
                replaced += n - start;
                break;
            }
        }
    }

    replaced
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn freq(n: usize) -> Vec<f64> {
        (1..=n).map(|f| f as f64).collect()
    }

    #[test]
    fn spike_is_bridged_between_clean_neighbours() {
        let frequency = freq(7);
        let reference = [0.0, 0.0, 0.0, 20.0, 20.0, 0.0, 0.0];
        let measured = [-100.0, -100.0, -100.0, -60.0, -60.0, -100.0, -100.0];

        let out = remove_spurs_with_report(&measured, Some(&reference), &frequency, &SpurConfig::default());

        assert_eq!(out.measured, vec![-100.0; 7]);
        assert_eq!(out.baseline_replaced, 2);
        assert_eq!(out.edge_replaced, 2);
        // both passes bridged the same two samples
        assert_eq!(out.total_replaced(), 2);
    }

    #[test]
    fn edge_pass_bridges_plateaus_the_baseline_follows() {
        // plateaus of 12 samples are wide enough for the 21-point median
        // baseline to rise with them, so only the edge pass can catch them
        let n = 70;
        let frequency = freq(n);
        let plateaus = [15..27, 40..52];
        let on_plateau = |i: usize| plateaus.iter().any(|p| p.contains(&i));
        let reference: Vec<f64> = (0..n).map(|i| if on_plateau(i) { 20.0 } else { 0.0 }).collect();
        let clean: Vec<f64> = frequency.iter().map(|f| -100.0 - 0.5 * f).collect();
        let measured: Vec<f64> = (0..n)
            .map(|i| if on_plateau(i) { clean[i] + 30.0 } else { clean[i] })
            .collect();

        assert!(detect_spur_mask(&reference, &SpurConfig::default()).iter().all(|&s| !s));

        let out = remove_spurs_with_report(&measured, Some(&reference), &frequency, &SpurConfig::default());

        assert_eq!(out.baseline_replaced, 0);
        assert_eq!(out.edge_replaced, 24);
        assert_eq!(out.total_replaced(), 24);
        for plateau in &plateaus {
            let (left, right) = (plateau.start - 1, plateau.end);
            for k in plateau.clone() {
                let expected = linear_interpolate(
                    frequency[left],
                    measured[left],
                    frequency[right],
                    measured[right],
                    frequency[k],
                );
                assert_abs_diff_eq!(out.measured[k], expected, epsilon = 1e-9);
                assert_abs_diff_eq!(out.measured[k], clean[k], epsilon = 1e-9);
            }
        }
        for i in (0..n).filter(|&i| !on_plateau(i)) {
            assert_eq!(out.measured[i], measured[i]);
        }
    }

    #[test]
    fn baseline_mask_flags_only_the_spike() {
        let reference = [0.0, 0.0, 0.0, 20.0, 20.0, 0.0, 0.0];
        let mask = detect_spur_mask(&reference, &SpurConfig::default());
        assert_eq!(mask, vec![false, false, false, true, true, false, false]);
    }

    #[test]
    fn interpolation_follows_frequency() {
        let frequency = freq(9);
        let mut reference = [0.0; 9];
        reference[4] = 15.0;
        let mut measured: Vec<f64> = (0..9).map(|i| -100.0 + 2.0 * i as f64).collect();
        measured[4] = -40.0;
        let config = SpurConfig::new(5.0, 5).unwrap();

        let out = remove_spurs(&measured, Some(&reference), &frequency, &config);

        assert_abs_diff_eq!(out[4], -92.0, epsilon = 1e-12);
        for i in (0..9).filter(|&i| i != 4) {
            assert_eq!(out[i], measured[i]);
        }
    }

    #[test]
    fn quiet_reference_leaves_measured_untouched() {
        let frequency = freq(40);
        let reference: Vec<f64> = (0..40).map(|i| -130.0 + 0.5 * i as f64).collect();
        let measured: Vec<f64> = (0..40).map(|i| -150.0 + ((i * 13) % 7) as f64).collect();

        let out = remove_spurs_with_report(&measured, Some(&reference), &frequency, &SpurConfig::default());

        assert_eq!(out.measured, measured);
        assert_eq!(out.total_replaced(), 0);
    }

    #[test]
    fn missing_or_short_reference_is_a_pass_through() {
        let measured = [-90.0, -95.0, -60.0, -95.0];
        let frequency = freq(4);
        assert_eq!(remove_spurs(&measured, None, &frequency, &SpurConfig::default()), measured);

        let short = [-90.0, -60.0];
        assert_eq!(
            remove_spurs(&short, Some(&[0.0, 30.0]), &freq(2), &SpurConfig::default()),
            short
        );
    }

    #[test]
    fn nan_reference_samples_are_never_spurs() {
        let frequency = freq(7);
        let reference = [0.0, 0.0, f64::NAN, f64::NAN, 0.0, 0.0, 0.0];
        let measured = [-100.0, -100.0, -50.0, -50.0, -100.0, -100.0, -100.0];

        let out = remove_spurs(&measured, Some(&reference), &frequency, &SpurConfig::default());

        assert_eq!(out, measured);
    }

    #[test]
    fn unmatched_rising_edge_holds_value_to_the_end() {
        let frequency = freq(7);
        let reference = [0.0, 0.0, 0.0, 20.0, 20.0, 20.0, 20.0];
        let measured = [-100.0, -100.0, -100.0, -60.0, -70.0, -80.0, -90.0];

        let out = remove_spurs_with_report(&measured, Some(&reference), &frequency, &SpurConfig::default());

        // the wide baseline follows the step, so only the edge pass fires
        assert_eq!(out.baseline_replaced, 0);
        assert_eq!(out.edge_replaced, 4);
        assert_eq!(out.measured, vec![-100.0; 7]);
    }

    #[test]
    fn mismatched_lengths_are_left_alone() {
        let measured = [-100.0, -60.0, -100.0, -100.0];
        let out = remove_spurs(&measured, Some(&[0.0, 20.0, 0.0]), &freq(4), &SpurConfig::default());
        assert_eq!(out, measured);
    }
}
