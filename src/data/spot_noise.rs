use std::collections::BTreeMap;

use log::debug;

use super::model::{DecadePoint, FrequencyRange, SpotNoisePoint};

/// A sample further than this factor from a decade frequency is not reported.
const MAX_FREQUENCY_RATIO: f64 = 5.0;

/// Read the noise level at each decade frequency inside `visible`.
///
/// For every decade target in the window the sample closest on a logarithmic
/// axis wins (first one on ties). It is reported only when its frequency is
/// within a factor of five of the target.
pub fn extract_spot_noise(
    frequency: &[f64],
    values: &[f64],
    visible: &FrequencyRange,
) -> BTreeMap<DecadePoint, SpotNoisePoint> {
    let max_distance = MAX_FREQUENCY_RATIO.ln();
    let mut spots = BTreeMap::new();

    for point in DecadePoint::all() {
        let target = point.frequency();
        if !visible.contains(target) {
            continue;
        }
        let log_target = target.ln();

        let mut best: Option<(f64, usize)> = None;
        for (i, &f) in frequency.iter().enumerate().take(values.len()) {
            let distance = (f.ln() - log_target).abs();
            if best.map_or(distance.is_finite(), |(d, _)| distance < d) {
                best = Some((distance, i));
            }
        }

        match best {
            Some((distance, i)) if distance < max_distance => {
                spots.insert(
                    point,
                    SpotNoisePoint {
                        label: point,
                        target_frequency: target,
                        actual_frequency: frequency[i],
                        noise_value: values[i],
                    },
                );
            }
            Some((_, i)) => {
                debug!(
                    "spot noise {point}: closest sample at {} Hz is too far, skipping",
                    frequency[i]
                );
            }
            None => {}
        }
    }

    debug!("calculated {} spot noise points", spots.len());
    spots
}
