use std::collections::BTreeMap;

use log::{info, warn};

use crate::config::{ConfigError, FilterConfig, PipelineConfig, SpurConfig};
use crate::data::filter::smooth;
use crate::data::model::{DecadePoint, FrequencyRange, PhaseNoiseDataset, SpotNoisePoint};
use crate::data::spot_noise::extract_spot_noise;
use crate::data::spur::remove_spurs_with_report;

// ---------------------------------------------------------------------------
// Pipeline for a single dataset
// ---------------------------------------------------------------------------

/// What spur removal did to a dataset on the last run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpurStatus {
    Disabled,
    /// Enabled, but the dataset has no reference channel.
    Unavailable,
    Applied { replaced: usize },
}

/// Output of one pipeline run over a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedChannels {
    pub measured: Vec<f64>,
    pub reference: Option<Vec<f64>>,
    pub spur_status: SpurStatus,
}

/// Run the conditioning pipeline on the raw channels of `dataset`.
///
/// Filtering (when enabled) smooths both channels. Spur removal (when enabled
/// and a reference exists) then works from the filtered channels if filtering
/// is on, from the raw ones otherwise. Nothing is carried over from earlier
/// runs.
pub fn process_dataset(dataset: &PhaseNoiseDataset, config: &PipelineConfig) -> ProcessedChannels {
    let (measured, reference) = if config.filtering_enabled {
        (
            smooth(dataset.measured(), &config.filter),
            dataset.reference().map(|r| smooth(r, &config.filter)),
        )
    } else {
        (
            dataset.measured().to_vec(),
            dataset.reference().map(<[f64]>::to_vec),
        )
    };

    if !config.spur_removal_enabled {
        return ProcessedChannels {
            measured,
            reference,
            spur_status: SpurStatus::Disabled,
        };
    }
    if reference.is_none() {
        return ProcessedChannels {
            measured,
            reference,
            spur_status: SpurStatus::Unavailable,
        };
    }

    let removal = remove_spurs_with_report(
        &measured,
        reference.as_deref(),
        dataset.frequency(),
        &config.spur,
    );
    ProcessedChannels {
        spur_status: SpurStatus::Applied {
            replaced: removal.total_replaced(),
        },
        measured: removal.measured,
        reference,
    }
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Opaque handle to a dataset held by a [`Session`]. Rendering layers keep
/// this instead of a reference into the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatasetId(usize);

#[derive(Debug, Clone)]
struct Entry {
    dataset: PhaseNoiseDataset,
    visible: bool,
    spur_status: SpurStatus,
}

/// Datasets, pipeline configuration and view window, independent of rendering.
#[derive(Debug, Clone, Default)]
pub struct Session {
    entries: Vec<Entry>,
    config: PipelineConfig,
    /// Frequency window used for spot noise (None until the first dataset).
    visible_range: Option<FrequencyRange>,
}

impl Session {
    /// Empty session with a validated configuration.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ingest a dataset and run the pipeline on it. The first dataset also
    /// sets the initial visible frequency window.
    pub fn add_dataset(&mut self, dataset: PhaseNoiseDataset) -> DatasetId {
        if self.visible_range.is_none() {
            self.visible_range = Some(FrequencyRange::for_frequencies(dataset.frequency()));
        }
        let id = DatasetId(self.entries.len());
        self.entries.push(Entry {
            dataset,
            visible: true,
            spur_status: SpurStatus::Disabled,
        });
        let config = self.config;
        Self::process_entry(&mut self.entries[id.0], &config);
        id
    }

    pub fn dataset(&self, id: DatasetId) -> Option<&PhaseNoiseDataset> {
        self.entries.get(id.0).map(|e| &e.dataset)
    }

    pub fn datasets(&self) -> impl Iterator<Item = (DatasetId, &PhaseNoiseDataset)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (DatasetId(i), &e.dataset))
    }

    pub fn has_any_reference(&self) -> bool {
        self.entries.iter().any(|e| e.dataset.has_reference())
    }

    // -- configuration --

    /// Replace the whole configuration and recompute every dataset.
    pub fn set_config(&mut self, config: PipelineConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        self.reprocess();
        Ok(())
    }

    pub fn set_filtering_enabled(&mut self, enabled: bool) {
        self.config.filtering_enabled = enabled;
        self.reprocess();
    }

    pub fn set_filter(&mut self, filter: FilterConfig) -> Result<(), ConfigError> {
        filter.validate()?;
        self.config.filter = filter;
        self.reprocess();
        Ok(())
    }

    pub fn set_spur_config(&mut self, spur: SpurConfig) -> Result<(), ConfigError> {
        spur.validate()?;
        self.config.spur = spur;
        self.reprocess();
        Ok(())
    }

    /// Switch spur removal. Enabling is refused while no loaded dataset has a
    /// reference channel. Returns whether spur removal is now enabled.
    pub fn set_spur_removal_enabled(&mut self, enabled: bool) -> bool {
        if enabled && !self.has_any_reference() {
            warn!("Spur removal requires reference noise data, which was not found in any loaded dataset");
            self.config.spur_removal_enabled = false;
        } else {
            self.config.spur_removal_enabled = enabled;
        }
        self.reprocess();
        self.config.spur_removal_enabled
    }

    // -- view --

    pub fn set_visible(&mut self, id: DatasetId, visible: bool) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            entry.visible = visible;
        }
    }

    pub fn is_visible(&self, id: DatasetId) -> bool {
        self.entries.get(id.0).is_some_and(|e| e.visible)
    }

    pub fn visible_range(&self) -> FrequencyRange {
        self.visible_range.unwrap_or_default()
    }

    pub fn set_visible_range(&mut self, range: FrequencyRange) {
        self.visible_range = Some(range);
    }

    // -- processing --

    /// Recompute the processed channels of every dataset from its raw data.
    pub fn reprocess(&mut self) {
        let config = self.config;
        for entry in &mut self.entries {
            Self::process_entry(entry, &config);
        }
        if self.entries.is_empty() {
            return;
        }
        if config.filtering_enabled {
            info!(
                "Applied {} filter (window={})",
                config.filter.kind, config.filter.window
            );
        }
        if config.spur_removal_enabled {
            info!("Spur removal applied");
        }
    }

    fn process_entry(entry: &mut Entry, config: &PipelineConfig) {
        let processed = process_dataset(&entry.dataset, config);
        entry.spur_status = processed.spur_status;
        entry.dataset.set_processed(processed.measured, processed.reference);
    }

    pub fn spur_status(&self, id: DatasetId) -> Option<SpurStatus> {
        self.entries.get(id.0).map(|e| e.spur_status)
    }

    /// Measured curve a renderer should draw for `id`.
    pub fn active_measured(&self, id: DatasetId) -> Option<&[f64]> {
        let ds = self.dataset(id)?;
        if self.config.filtering_enabled || self.config.spur_removal_enabled {
            Some(ds.measured_processed())
        } else {
            Some(ds.measured())
        }
    }

    /// Reference curve a renderer should draw for `id`, if it has one.
    pub fn active_reference(&self, id: DatasetId) -> Option<&[f64]> {
        let ds = self.dataset(id)?;
        if self.config.filtering_enabled {
            ds.reference_processed()
        } else {
            ds.reference()
        }
    }

    /// Spot noise of the first visible dataset within the visible window.
    pub fn spot_noise(&self) -> BTreeMap<DecadePoint, SpotNoisePoint> {
        let Some((id, dataset)) = self
            .datasets()
            .find(|(id, ds)| self.is_visible(*id) && !ds.is_empty())
        else {
            warn!("No visible dataset to calculate spot noise from");
            return BTreeMap::new();
        };
        let measured = self.active_measured(id).unwrap_or_default();
        extract_spot_noise(dataset.frequency(), measured, &self.visible_range())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterKind;

    fn spiky_dataset(name: &str) -> PhaseNoiseDataset {
        PhaseNoiseDataset::new(
            name,
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0],
            vec![-100.0, -100.0, -100.0, -60.0, -60.0, -100.0, -100.0],
            Some(vec![0.0, 0.0, 0.0, 20.0, 20.0, 0.0, 0.0]),
        )
        .unwrap()
    }

    fn plain_dataset(name: &str) -> PhaseNoiseDataset {
        PhaseNoiseDataset::new(
            name,
            vec![10.0, 100.0, 1000.0, 10000.0],
            vec![-90.0, -110.0, -120.0, -130.0],
            None,
        )
        .unwrap()
    }

    #[test]
    fn pipeline_is_identity_when_everything_is_off() {
        let ds = spiky_dataset("a");
        let out = process_dataset(&ds, &PipelineConfig::default());
        assert_eq!(out.measured, ds.measured());
        assert_eq!(out.reference.as_deref(), ds.reference());
        assert_eq!(out.spur_status, SpurStatus::Disabled);
    }

    #[test]
    fn spur_removal_on_raw_channels() {
        let ds = spiky_dataset("a");
        let config = PipelineConfig {
            spur_removal_enabled: true,
            ..PipelineConfig::default()
        };
        let out = process_dataset(&ds, &config);
        assert_eq!(out.measured, vec![-100.0; 7]);
        assert_eq!(out.spur_status, SpurStatus::Applied { replaced: 2 });
        // reference is shown as is
        assert_eq!(out.reference.as_deref(), ds.reference());
    }

    #[test]
    fn spur_removal_without_reference_is_unavailable() {
        let ds = plain_dataset("b");
        let config = PipelineConfig {
            spur_removal_enabled: true,
            ..PipelineConfig::default()
        };
        let out = process_dataset(&ds, &config);
        assert_eq!(out.measured, ds.measured());
        assert_eq!(out.spur_status, SpurStatus::Unavailable);
    }

    #[test]
    fn filtering_smooths_both_channels() {
        let ds = spiky_dataset("a");
        let config = PipelineConfig {
            filtering_enabled: true,
            filter: FilterConfig::new(FilterKind::Median, 3).unwrap(),
            ..PipelineConfig::default()
        };
        let out = process_dataset(&ds, &config);
        assert_eq!(out.measured, vec![-100.0, -100.0, -100.0, -60.0, -60.0, -100.0, -100.0]);
        assert_eq!(out.reference.unwrap(), vec![0.0, 0.0, 0.0, 20.0, 20.0, 0.0, 0.0]);

        let config = PipelineConfig {
            filter: FilterConfig::new(FilterKind::Median, 5).unwrap(),
            ..config
        };
        let out = process_dataset(&ds, &config);
        assert_eq!(out.measured, vec![-100.0; 7]);
    }

    #[test]
    fn spur_removal_reads_filtered_channels_when_filtering() {
        let n = 30;
        let frequency: Vec<f64> = (1..=n).map(|f| f as f64).collect();
        let jitter = |i: usize| if i % 2 == 0 { 3.0 } else { -3.0 };
        let mut measured: Vec<f64> = (0..n).map(|i| -110.0 + jitter(i)).collect();
        let mut reference: Vec<f64> = (0..n).map(|i| -140.0 + 0.5 * jitter(i)).collect();
        measured[15] = -60.0;
        reference[15] = -100.0;
        let ds = PhaseNoiseDataset::new("f", frequency.clone(), measured.clone(), Some(reference.clone()))
            .unwrap();

        let config = PipelineConfig {
            filtering_enabled: true,
            spur_removal_enabled: true,
            filter: FilterConfig::new(FilterKind::MovingAverage, 5).unwrap(),
            ..PipelineConfig::default()
        };
        let out = process_dataset(&ds, &config);

        let filtered_measured = smooth(&measured, &config.filter);
        let filtered_reference = smooth(&reference, &config.filter);
        let from_filtered = crate::data::spur::remove_spurs(
            &filtered_measured,
            Some(&filtered_reference),
            &frequency,
            &config.spur,
        );
        let from_raw =
            crate::data::spur::remove_spurs(&measured, Some(&reference), &frequency, &config.spur);

        assert_eq!(out.measured, from_filtered);
        assert_ne!(out.measured, from_raw);
        assert_eq!(out.reference, Some(filtered_reference));
        assert!(matches!(out.spur_status, SpurStatus::Applied { replaced } if replaced > 0));
    }

    #[test]
    fn new_session_validates_config() {
        let bad = PipelineConfig {
            spur: SpurConfig {
                threshold_db: 5.0,
                baseline_window: usize::MAX,
            },
            ..PipelineConfig::default()
        };
        assert!(matches!(
            Session::new(bad),
            Err(ConfigError::BaselineWindowOutOfRange { .. })
        ));
        let session = Session::new(PipelineConfig::default()).unwrap();
        assert!(session.is_empty());
    }

    #[test]
    fn refuses_spur_removal_without_any_reference() {
        let mut session = Session::default();
        assert!(!session.set_spur_removal_enabled(true));

        session.add_dataset(plain_dataset("b"));
        assert!(!session.set_spur_removal_enabled(true));
        assert!(!session.config().spur_removal_enabled);

        let id = session.add_dataset(spiky_dataset("a"));
        assert!(session.set_spur_removal_enabled(true));
        assert_eq!(session.active_measured(id).unwrap(), &[-100.0; 7]);
        assert_eq!(session.spur_status(DatasetId(0)), Some(SpurStatus::Unavailable));
    }

    #[test]
    fn toggling_off_restores_raw_curves() {
        let mut session = Session::default();
        let id = session.add_dataset(spiky_dataset("a"));
        session.set_spur_removal_enabled(true);
        session.set_spur_removal_enabled(false);
        let raw = session.dataset(id).unwrap().measured().to_vec();
        assert_eq!(session.active_measured(id).unwrap(), raw.as_slice());
        assert_eq!(session.dataset(id).unwrap().measured_processed(), raw.as_slice());
    }

    #[test]
    fn invalid_filter_is_rejected_and_config_kept() {
        let mut session = Session::default();
        let bad = FilterConfig {
            kind: FilterKind::Median,
            window: 99,
        };
        assert!(session.set_filter(bad).is_err());
        assert_eq!(session.config().filter, FilterConfig::default());
    }

    #[test]
    fn spot_noise_uses_first_visible_dataset_and_range() {
        let mut session = Session::default();
        let first = session.add_dataset(plain_dataset("b"));
        let second = session.add_dataset(
            PhaseNoiseDataset::new("c", vec![10.0, 1000.0], vec![-80.0, -100.0], None).unwrap(),
        );

        assert_eq!(session.visible_range(), FrequencyRange { min: 10.0, max: 1e4 });
        let spots = session.spot_noise();
        assert_eq!(spots.len(), 4);
        assert_eq!(spots[&DecadePoint::from_frequency(1e3).unwrap()].noise_value, -120.0);

        session.set_visible(first, false);
        assert!(session.is_visible(second));
        let spots = session.spot_noise();
        assert_eq!(spots[&DecadePoint::from_frequency(1e3).unwrap()].noise_value, -100.0);

        session.set_visible(first, true);
        session.set_visible_range(FrequencyRange::new(100.0, 1000.0));
        let labels: Vec<String> = session.spot_noise().keys().map(|p| p.label()).collect();
        assert_eq!(labels, ["100 Hz", "1 kHz"]);
    }

    #[test]
    fn no_visible_dataset_gives_empty_spot_noise() {
        let mut session = Session::default();
        assert!(session.spot_noise().is_empty());
        let id = session.add_dataset(plain_dataset("b"));
        session.set_visible(id, false);
        assert!(session.spot_noise().is_empty());
    }
}
