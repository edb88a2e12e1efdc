//! Inverse-distance weighting of station corrections onto the grid.

use rayon::prelude::*;
use std::f64::consts::PI;

use crate::constants::{SpeciesParams, SUM_BOUND};
use crate::errors::{CalibrationError, CalibrationResult};
use crate::grid::{Coord, GridSnapshot};
use crate::species::FieldId;

/// Added to the longitude difference so a station on a grid point has a finite weight.
pub const DISTANCE_EPSILON: f64 = 1e-14;

/// How the weighted correction is applied to the current field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineMode {
    Multiply,
    Sum,
}

impl CombineMode {
    fn apply(self, old: f64, correction: f64) -> f64 {
        match self {
            CombineMode::Multiply => old * correction,
            CombineMode::Sum => old + correction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClampBounds {
    pub min: f64,
    pub max: f64,
}

impl ClampBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Bounds for additive threshold updates.
    pub fn unbounded() -> Self {
        Self::new(-SUM_BOUND, SUM_BOUND)
    }

    pub fn tune(params: &SpeciesParams) -> Self {
        Self::new(params.tune_min, params.tune_max)
    }

    /// NaN stays NaN.
    pub fn apply(&self, value: f64) -> f64 {
        if value > self.max {
            self.max
        } else if value < self.min {
            self.min
        } else {
            value
        }
    }
}

/// Pseudo-distance in radians with the longitude difference scaled by cos(latitude).
pub fn angular_distance(grid: Coord, station: Coord) -> f64 {
    let deg = PI / 180.0;
    let dlon = (grid.lon - station.lon + DISTANCE_EPSILON) * deg * (grid.lat * deg).cos();
    let dlat = (grid.lat - station.lat) * deg;
    (dlon * dlon + dlat * dlat).sqrt().max(f64::MIN_POSITIVE)
}

/// Weighted correction at one grid point: `Σ(v/d) / Σ(1/d)`.
pub fn weighted_correction(point: Coord, stations: &[Coord], values: &[f64]) -> f64 {
    let (weighted, weights) = stations
        .iter()
        .zip(values)
        .fold((0.0_f64, 0.0_f64), |(num, den), (station, value)| {
            let inverse = 1.0 / angular_distance(point, *station);
            (num + value * inverse, den + inverse)
        });
    weighted / weights
}

/// Applies the weighted station corrections to every point of `base`.
pub fn interpolate_values(
    values: &[f64],
    base: &[f64],
    lat: &[f64],
    lon: &[f64],
    stations: &[Coord],
    mode: CombineMode,
    bounds: ClampBounds,
) -> Vec<f64> {
    base.par_iter()
        .zip(lat.par_iter().zip(lon.par_iter()))
        .map(|(old, (lat, lon))| {
            let correction = weighted_correction(Coord::new(*lat, *lon), stations, values);
            bounds.apply(mode.apply(*old, correction))
        })
        .collect()
}

/// Spreads per-station corrections over the grid and combines them with the
/// current values of `field`.
pub fn interpolate(
    values: &[f64],
    grid: &GridSnapshot,
    field: FieldId,
    stations: &[Coord],
    mode: CombineMode,
    bounds: ClampBounds,
) -> CalibrationResult<Vec<f64>> {
    if values.len() != stations.len() {
        return Err(CalibrationError::StationCountMismatch {
            what: format!("corrections for {}", field),
            expected: stations.len(),
            found: values.len(),
        });
    }
    let base = grid.pollen_field(field)?;
    Ok(interpolate_values(
        values,
        base,
        grid.latitudes(),
        grid.longitudes(),
        stations,
        mode,
        bounds,
    ))
}
