//! Data layer: datasets, loading, and the conditioning pipeline.
//!
//! Architecture:
//! ```text
//!  .csv / .txt / .json / .parquet
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  parse file → PhaseNoiseDataset (sorted by frequency)
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  filter   │  moving average / median / Savitzky-Golay (optional)
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │   spur    │  reference-driven spur bridging (optional)
//!   └──────────┘      └─ interpolate
//!        │
//!        ▼
//!   ┌────────────┐
//!   │ spot_noise │  decade-point readout within the visible window
//!   └────────────┘
//! ```

pub mod filter;
pub mod interpolate;
pub mod loader;
pub mod model;
pub mod spot_noise;
pub mod spur;
