//! Conditioning of phase-noise measurement curves: smoothing, reference-driven
//! spur removal and decade spot-noise readout.

pub mod app;
pub mod config;
pub mod data;
pub mod export;
pub mod state;
