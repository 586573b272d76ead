use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Defaults and limits
// ---------------------------------------------------------------------------

pub const DEFAULT_FILTER_WINDOW: usize = 11;
pub const MIN_FILTER_WINDOW: usize = 3;
pub const MAX_FILTER_WINDOW: usize = 51;

/// dB above the local baseline for a reference sample to count as a spur.
pub const DEFAULT_SPUR_THRESHOLD_DB: f64 = 5.0;
pub const DEFAULT_SPUR_BASELINE_WINDOW: usize = 21;
pub const MAX_SPUR_BASELINE_WINDOW: usize = 101;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Configuration rejected before it reaches the conditioning pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("filter window {window} is outside [{min}, {max}]")]
    WindowOutOfRange { window: usize, min: usize, max: usize },
    #[error("spur baseline window {window} is outside [{min}, {max}]")]
    BaselineWindowOutOfRange { window: usize, min: usize, max: usize },
    #[error("spur threshold {0} dB must be finite and non-negative")]
    InvalidThreshold(f64),
    #[error("unknown filter kind '{0}' (expected moving-average, median or savitzky-golay)")]
    UnknownFilterKind(String),
}

// ---------------------------------------------------------------------------
// Filter configuration
// ---------------------------------------------------------------------------

/// Smoothing algorithm applied by the filter engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKind {
    #[default]
    MovingAverage,
    Median,
    SavitzkyGolay,
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKind::MovingAverage => write!(f, "Moving Average"),
            FilterKind::Median => write!(f, "Median Filter"),
            FilterKind::SavitzkyGolay => write!(f, "Savitzky-Golay"),
        }
    }
}

impl FromStr for FilterKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "moving-average" | "mean" => Ok(FilterKind::MovingAverage),
            "median" | "median-filter" => Ok(FilterKind::Median),
            "savitzky-golay" | "sg" => Ok(FilterKind::SavitzkyGolay),
            _ => Err(ConfigError::UnknownFilterKind(s.to_string())),
        }
    }
}

/// Filter kind plus window length (samples).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub kind: FilterKind,
    pub window: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            kind: FilterKind::default(),
            window: DEFAULT_FILTER_WINDOW,
        }
    }
}

impl FilterConfig {
    pub fn new(kind: FilterKind, window: usize) -> Result<Self, ConfigError> {
        let config = Self { kind, window };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_FILTER_WINDOW..=MAX_FILTER_WINDOW).contains(&self.window) {
            return Err(ConfigError::WindowOutOfRange {
                window: self.window,
                min: MIN_FILTER_WINDOW,
                max: MAX_FILTER_WINDOW,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Spur configuration
// ---------------------------------------------------------------------------

/// Parameters of the reference-driven spur remover.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpurConfig {
    pub threshold_db: f64,
    /// Median window used to build the reference baseline.
    pub baseline_window: usize,
}

impl Default for SpurConfig {
    fn default() -> Self {
        Self {
            threshold_db: DEFAULT_SPUR_THRESHOLD_DB,
            baseline_window: DEFAULT_SPUR_BASELINE_WINDOW,
        }
    }
}

impl SpurConfig {
    pub fn new(threshold_db: f64, baseline_window: usize) -> Result<Self, ConfigError> {
        let config = Self {
            threshold_db,
            baseline_window,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold_db.is_finite() || self.threshold_db < 0.0 {
            return Err(ConfigError::InvalidThreshold(self.threshold_db));
        }
        if !(MIN_FILTER_WINDOW..=MAX_SPUR_BASELINE_WINDOW).contains(&self.baseline_window) {
            return Err(ConfigError::BaselineWindowOutOfRange {
                window: self.baseline_window,
                min: MIN_FILTER_WINDOW,
                max: MAX_SPUR_BASELINE_WINDOW,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Pipeline configuration
// ---------------------------------------------------------------------------

/// Everything the conditioning pipeline needs for one run.
///
/// The two switches correspond to the "Filter" and "SpurRem" toggles of an
/// interactive front end.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub filtering_enabled: bool,
    pub spur_removal_enabled: bool,
    pub filter: FilterConfig,
    pub spur: SpurConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.filter.validate()?;
        self.spur.validate()
    }

    /// Read and validate a JSON config file. Missing fields take defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: PipelineConfig = serde_json::from_str(&text).context("parsing config JSON")?;
        config
            .validate()
            .with_context(|| format!("invalid config in {}", path.display()))?;
        Ok(config)
    }
}
