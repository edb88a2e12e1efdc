//! Calibration of pollen emission fields against station observations.
//!
//! Two hourly cycles share one pipeline: station concentrations are read from
//! ATAB tables, rule engines turn them into per-station corrections, and the
//! corrections are spread over the grid by inverse-distance weighting.

pub mod atab;
pub mod calibration;
pub mod config;
pub mod constants;
pub mod errors;
pub mod field_store;
pub mod grid;
pub mod interpolation;
pub mod logging;
pub mod phenology;
pub mod species;
pub mod strength;

pub use calibration::{update_phenology, update_strength, CalibrationSummary, Calibrator};
pub use config::{load_config, Config};
pub use errors::{CalibrationError, CalibrationResult};
pub use species::{FieldId, FieldKind, Species};

#[cfg(test)]
mod tests;
