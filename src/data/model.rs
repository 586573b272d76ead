use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Decade points – the fixed spot-noise frequencies
// ---------------------------------------------------------------------------

/// Standard offsets (Hz) at which spot noise is reported. Also the steps the
/// visible frequency window snaps to.
pub const DECADE_FREQUENCIES: [f64; 9] = [0.1, 1.0, 10.0, 100.0, 1e3, 1e4, 1e5, 1e6, 1e7];

/// One of the nine decade frequencies, ordered by frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecadePoint(usize);

impl DecadePoint {
    /// All decade points, lowest frequency first.
    pub fn all() -> impl Iterator<Item = DecadePoint> {
        (0..DECADE_FREQUENCIES.len()).map(DecadePoint)
    }

    /// Decade point for an exact decade frequency, if it is one.
    pub fn from_frequency(frequency: f64) -> Option<Self> {
        DECADE_FREQUENCIES
            .iter()
            .position(|&f| f == frequency)
            .map(DecadePoint)
    }

    pub fn frequency(self) -> f64 {
        DECADE_FREQUENCIES[self.0]
    }

    fn scaled(self) -> (f64, &'static str) {
        let f = self.frequency();
        if f >= 1e6 {
            (f / 1e6, "MHz")
        } else if f >= 1e3 {
            (f / 1e3, "kHz")
        } else {
            (f, "Hz")
        }
    }

    /// Short label, e.g. `"0.1 Hz"`, `"1 kHz"`.
    pub fn label(self) -> String {
        let (value, unit) = self.scaled();
        format!("{value} {unit}")
    }

    /// Label with three decimals, e.g. `"1.000 kHz"`, used by the text table.
    pub fn long_label(self) -> String {
        let (value, unit) = self.scaled();
        format!("{value:.3} {unit}")
    }
}

impl fmt::Display for DecadePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Representative noise level read off a curve near one decade frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotNoisePoint {
    pub label: DecadePoint,
    pub target_frequency: f64,
    /// Frequency of the sample actually picked.
    pub actual_frequency: f64,
    /// dBc/Hz at `actual_frequency`.
    pub noise_value: f64,
}

// ---------------------------------------------------------------------------
// FrequencyRange – the visible window on the frequency axis
// ---------------------------------------------------------------------------

/// Closed frequency interval `[min, max]` in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyRange {
    pub min: f64,
    pub max: f64,
}

impl Default for FrequencyRange {
    fn default() -> Self {
        Self {
            min: DECADE_FREQUENCIES[0],
            max: DECADE_FREQUENCIES[DECADE_FREQUENCIES.len() - 1],
        }
    }
}

impl FrequencyRange {
    /// Build a range; reversed bounds are swapped.
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn contains(&self, frequency: f64) -> bool {
        frequency >= self.min && frequency <= self.max
    }

    /// Initial view for a curve: the data span widened by 10% on each side,
    /// with both ends snapped to decade steps that are at least one step apart.
    pub fn for_frequencies(frequency: &[f64]) -> Self {
        if frequency.is_empty() {
            return Self::default();
        }
        let data_min = frequency.iter().copied().fold(f64::INFINITY, f64::min);
        let data_max = frequency.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let lowest = DECADE_FREQUENCIES[0];
        let highest = DECADE_FREQUENCIES[DECADE_FREQUENCIES.len() - 1];
        let view_min = lowest.max(data_min * 0.9);
        let mut view_max = (highest * 10.0).min(data_max * 1.1);
        if view_max <= view_min {
            view_max = view_min * 10.0;
        }

        let last = DECADE_FREQUENCIES.len() - 1;
        let mut min_idx = closest_decade_index(view_min);
        let mut max_idx = closest_decade_index(view_max);
        if max_idx <= min_idx {
            max_idx = (min_idx + 1).min(last);
            if min_idx >= max_idx {
                min_idx = max_idx.saturating_sub(1);
            }
        }

        Self {
            min: DECADE_FREQUENCIES[min_idx],
            max: DECADE_FREQUENCIES[max_idx],
        }
    }
}

/// Index of the decade step nearest to `frequency` (absolute distance, the
/// lower step wins ties).
pub fn closest_decade_index(frequency: f64) -> usize {
    let idx = DECADE_FREQUENCIES.partition_point(|&f| f < frequency);
    if idx == 0 {
        return 0;
    }
    if idx == DECADE_FREQUENCIES.len() {
        return DECADE_FREQUENCIES.len() - 1;
    }
    if (DECADE_FREQUENCIES[idx] - frequency).abs() < (DECADE_FREQUENCIES[idx - 1] - frequency).abs() {
        idx
    } else {
        idx - 1
    }
}

// ---------------------------------------------------------------------------
// PhaseNoiseDataset – one measurement with its processed copies
// ---------------------------------------------------------------------------

/// Why a set of channels cannot form a dataset.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DatasetError {
    #[error("dataset has no samples")]
    Empty,
    #[error("{channel} channel has {found} samples, expected {expected}")]
    LengthMismatch {
        channel: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("frequency offset {value} at sample {index} is not a positive number")]
    InvalidFrequency { index: usize, value: f64 },
}

/// A swept phase-noise measurement.
///
/// The raw channels are fixed at construction, sorted by ascending frequency.
/// Only the processed copies change afterwards, always wholesale.
#[derive(Debug, Clone)]
pub struct PhaseNoiseDataset {
    /// Display name (usually the file stem).
    pub name: String,
    frequency: Vec<f64>,
    measured: Vec<f64>,
    reference: Option<Vec<f64>>,
    measured_processed: Vec<f64>,
    reference_processed: Option<Vec<f64>>,
}

impl PhaseNoiseDataset {
    /// Validate the channels and order samples by frequency.
    ///
    /// A reference channel that is entirely NaN counts as absent.
    pub fn new(
        name: impl Into<String>,
        frequency: Vec<f64>,
        measured: Vec<f64>,
        reference: Option<Vec<f64>>,
    ) -> Result<Self, DatasetError> {
        let n = frequency.len();
        if n == 0 {
            return Err(DatasetError::Empty);
        }
        if measured.len() != n {
            return Err(DatasetError::LengthMismatch {
                channel: "measured",
                expected: n,
                found: measured.len(),
            });
        }
        if let Some(r) = &reference {
            if r.len() != n {
                return Err(DatasetError::LengthMismatch {
                    channel: "reference",
                    expected: n,
                    found: r.len(),
                });
            }
        }
        if let Some((index, &value)) = frequency
            .iter()
            .enumerate()
            .find(|(_, f)| !f.is_finite() || **f <= 0.0)
        {
            return Err(DatasetError::InvalidFrequency { index, value });
        }

        let reference = reference.filter(|r| r.iter().any(|v| !v.is_nan()));

        let (frequency, measured, reference) =
            if frequency.windows(2).all(|w| w[0] <= w[1]) {
                (frequency, measured, reference)
            } else {
                log::debug!("sorting {n} samples by frequency");
                let mut order: Vec<usize> = (0..n).collect();
                order.sort_by(|&a, &b| frequency[a].total_cmp(&frequency[b]));
                let permute = |v: &[f64]| order.iter().map(|&i| v[i]).collect::<Vec<f64>>();
                (
                    permute(&frequency),
                    permute(&measured),
                    reference.as_deref().map(permute),
                )
            };

        Ok(Self {
            name: name.into(),
            measured_processed: measured.clone(),
            reference_processed: reference.clone(),
            frequency,
            measured,
            reference,
        })
    }

    pub fn len(&self) -> usize {
        self.frequency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequency.is_empty()
    }

    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    pub fn frequency(&self) -> &[f64] {
        &self.frequency
    }

    pub fn measured(&self) -> &[f64] {
        &self.measured
    }

    pub fn reference(&self) -> Option<&[f64]> {
        self.reference.as_deref()
    }

    /// Measured channel after the last pipeline run.
    pub fn measured_processed(&self) -> &[f64] {
        &self.measured_processed
    }

    /// Reference channel after the last pipeline run.
    pub fn reference_processed(&self) -> Option<&[f64]> {
        self.reference_processed.as_deref()
    }

    /// Replace both processed channels. Lengths must match the raw channels.
    pub(crate) fn set_processed(&mut self, measured: Vec<f64>, reference: Option<Vec<f64>>) {
        debug_assert_eq!(measured.len(), self.len());
        self.measured_processed = measured;
        self.reference_processed = reference;
    }
}
