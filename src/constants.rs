//! Per-species calibration constants and the fixed numbers of the rule engines.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::errors::ConfigError;
use crate::species::Species;

/// Offset from Kelvin to degrees Celsius.
pub const KELVIN_OFFSET: f64 = 273.15;
/// Added to the day of the year to get the calibration date
/// (days since Dec 1 of the previous year).
pub const DATE_OFFSET_DAYS: u32 = 32;
/// Hours in the most recent concentration window.
pub const LAST_DAY_HOURS: usize = 24;
/// Days after the season start during which a late start is still corrected,
/// and days before the end in which the season end is adjusted.
pub const SEASON_EDGE_DAYS: f64 = 5.0;
/// Bound on the season length change of grass, in days.
pub const SAISL_FAILSAFE: f64 = 7.0;
/// Bound applied to additive field updates.
pub const SUM_BOUND: f64 = 1e10;
/// Tuning factor that leaves the emission unchanged.
pub const TUNE_NEUTRAL: f64 = 1.0;
/// Two values closer than this are considered equal to the missing-value sentinel.
pub const MISSING_TOLERANCE: f64 = 0.01;
/// A station series with at least this fraction of missing hours cannot be repaired.
pub const MAX_MISSING_FRACTION: f64 = 0.5;
/// Hourly concentration assigned to a tolerated unrepairable station.
pub const UNREPAIRABLE_FILL: f64 = 1.0;

/// Calibration constants for one species.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeciesParams {
    /// Concentration sum threshold for the last 24 hours.
    pub thr_con_24: f64,
    /// Concentration sum threshold for the whole window.
    pub thr_con_120: f64,
    /// Bound on temperature-sum threshold changes.
    pub failsafe: f64,
    /// Days since Dec 1 excluded from the temperature sum.
    pub jul_days_excl: f64,
    pub tune_min: f64,
    pub tune_max: f64,
}

/// Partial override of [`SpeciesParams`] as read from the configuration file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeciesParamsOverride {
    #[serde(default)]
    pub thr_con_24: Option<f64>,
    #[serde(default)]
    pub thr_con_120: Option<f64>,
    #[serde(default)]
    pub failsafe: Option<f64>,
    #[serde(default)]
    pub jul_days_excl: Option<f64>,
    #[serde(default)]
    pub tune_min: Option<f64>,
    #[serde(default)]
    pub tune_max: Option<f64>,
}

impl SpeciesParams {
    pub fn defaults(species: Species) -> Self {
        match species {
            Species::Alnu => Self {
                thr_con_24: 120.0,
                thr_con_120: 360.0,
                failsafe: 1000.0,
                jul_days_excl: 14.0,
                tune_min: 0.235,
                tune_max: 3.389,
            },
            Species::Betu => Self {
                thr_con_24: 240.0,
                thr_con_120: 720.0,
                failsafe: 2500.0,
                jul_days_excl: 40.0,
                tune_min: 0.222,
                tune_max: 4.046,
            },
            Species::Poac => Self {
                thr_con_24: 72.0,
                thr_con_120: 216.0,
                failsafe: 6000.0,
                jul_days_excl: 46.0,
                tune_min: 0.405,
                tune_max: 1.875,
            },
            Species::Cory => Self {
                thr_con_24: 120.0,
                thr_con_120: 360.0,
                failsafe: 2500.0,
                jul_days_excl: 3.0,
                tune_min: 0.216,
                tune_max: 7.738,
            },
        }
    }

    fn apply(mut self, o: &SpeciesParamsOverride) -> Self {
        if let Some(v) = o.thr_con_24 {
            self.thr_con_24 = v;
        }
        if let Some(v) = o.thr_con_120 {
            self.thr_con_120 = v;
        }
        if let Some(v) = o.failsafe {
            self.failsafe = v;
        }
        if let Some(v) = o.jul_days_excl {
            self.jul_days_excl = v;
        }
        if let Some(v) = o.tune_min {
            self.tune_min = v;
        }
        if let Some(v) = o.tune_max {
            self.tune_max = v;
        }
        self
    }

    fn validate(&self, species: Species) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: format!("species_constants.{}", species.code()),
            message,
        };
        let all = [
            self.thr_con_24,
            self.thr_con_120,
            self.failsafe,
            self.jul_days_excl,
            self.tune_min,
            self.tune_max,
        ];
        if all.iter().any(|v| !v.is_finite()) {
            return Err(invalid("constants must be finite".to_string()));
        }
        if self.failsafe < 0.0 {
            return Err(invalid(format!("failsafe {} is negative", self.failsafe)));
        }
        if self.tune_min <= 0.0 || self.tune_min > self.tune_max {
            return Err(invalid(format!(
                "tune bounds [{}, {}] must be positive and ordered",
                self.tune_min, self.tune_max
            )));
        }
        Ok(())
    }
}

/// The constant table for all species.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesConstants {
    params: [SpeciesParams; 4],
}

impl Default for SpeciesConstants {
    fn default() -> Self {
        Self {
            params: Species::ALL.map(SpeciesParams::defaults),
        }
    }
}

impl SpeciesConstants {
    pub fn with_overrides(
        overrides: &HashMap<Species, SpeciesParamsOverride>,
    ) -> Result<Self, ConfigError> {
        let mut constants = Self::default();
        for (species, o) in overrides {
            let params = constants.params[species.index()].apply(o);
            params.validate(*species)?;
            constants.params[species.index()] = params;
        }
        Ok(constants)
    }

    pub fn get(&self, species: Species) -> &SpeciesParams {
        &self.params[species.index()]
    }

    pub fn set(&mut self, species: Species, params: SpeciesParams) {
        self.params[species.index()] = params;
    }

    pub fn log_table(&self) {
        for species in Species::ALL {
            let p = self.get(species);
            info!(
                species = %species,
                thr_con_24 = p.thr_con_24,
                thr_con_120 = p.thr_con_120,
                failsafe = p.failsafe,
                jul_days_excl = p.jul_days_excl,
                tune_min = p.tune_min,
                tune_max = p.tune_max,
                "Calibration constants"
            );
        }
    }
}
