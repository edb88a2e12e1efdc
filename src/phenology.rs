//! Corrections of the season start and end thresholds.
//!
//! The season start threshold (`tthrs`) is pulled down when high concentrations
//! are observed before the modelled start, and pushed up when the model started
//! the season but the stations stay quiet. The season end (`tthre`, or the
//! season length `saisl` for grass) is adjusted in the days before the modelled end.

use tracing::{debug, warn};

use crate::atab::ObsModData;
use crate::constants::{SpeciesParams, KELVIN_OFFSET, SAISL_FAILSAFE, SEASON_EDGE_DAYS};
use crate::errors::{CalibrationError, CalibrationResult};
use crate::grid::GridSnapshot;
use crate::species::{FieldId, FieldKind, PhenologyFieldSet, Species, T_2M};

/// How the end of the season is described at one station.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeasonEnd {
    /// Temperature-sum threshold (`tthre`).
    Threshold(f64),
    /// Season length in days (`saisl`).
    Length(f64),
}

/// Model state at the grid point nearest to a station.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhenologyState {
    pub tthrs: f64,
    pub season_end: SeasonEnd,
    pub saisn: f64,
    pub ctsum: f64,
    /// 2m temperature in degrees Celsius.
    pub t2m: f64,
}

/// Observed concentration sums at one station.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConcentrationSums {
    pub last_day: f64,
    pub window: f64,
}

impl ConcentrationSums {
    fn low(&self, p: &SpeciesParams) -> bool {
        (0.0..p.thr_con_24).contains(&self.last_day) && (0.0..p.thr_con_120).contains(&self.window)
    }

    fn reached(&self, p: &SpeciesParams) -> bool {
        self.last_day >= p.thr_con_24 && self.window >= p.thr_con_120
    }

    fn exceeded(&self, p: &SpeciesParams) -> bool {
        self.last_day > p.thr_con_24 && self.window > p.thr_con_120
    }
}

/// Clamped change of the start threshold and of the season end at one station.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationChange {
    pub tthrs: f64,
    pub season_end: f64,
}

/// Symmetric clamp that lets NaN through, so callers can detect it.
fn bound(value: f64, limit: f64) -> f64 {
    if value > limit {
        limit
    } else if value < -limit {
        -limit
    } else {
        value
    }
}

/// Evaluates the phenology rules for one station. `date` counts days since Dec 1.
pub fn station_change(
    params: &SpeciesParams,
    state: &PhenologyState,
    sums: ConcentrationSums,
    date: f64,
) -> StationChange {
    let PhenologyState {
        tthrs,
        season_end,
        saisn,
        ctsum,
        t2m,
    } = *state;
    let nudge = t2m * (date - params.jul_days_excl);
    let low = sums.low(params);

    let mut d_tthrs = 0.0;
    let mut d_end = 0.0;

    // Season start
    if sums.reached(params) && ctsum < tthrs {
        d_tthrs = ctsum - tthrs;
        if let SeasonEnd::Threshold(_) = season_end {
            d_end = ctsum - tthrs;
        }
    } else if low && tthrs < ctsum && 0.0 < saisn && saisn < SEASON_EDGE_DAYS {
        match season_end {
            SeasonEnd::Threshold(tthre) if ctsum < tthre => {
                d_end = nudge;
                d_tthrs = nudge;
            }
            SeasonEnd::Length(saisl) if saisn < saisl => {
                d_tthrs = nudge;
            }
            _ => {}
        }
    }

    // Season end
    match season_end {
        SeasonEnd::Threshold(tthre) => {
            let in_band = tthre - SEASON_EDGE_DAYS * nudge < ctsum && ctsum < tthre;
            if low && in_band {
                d_end += ctsum - tthre;
            } else if sums.exceeded(params) && in_band {
                d_end += nudge;
            }
        }
        SeasonEnd::Length(saisl) => {
            let ending = saisn < saisl && saisl < saisn + SEASON_EDGE_DAYS;
            if low && ending {
                d_end = saisn - saisl;
            } else if sums.exceeded(params) && ending {
                d_end = 1.0;
            }
        }
    }

    let end_limit = match season_end {
        SeasonEnd::Threshold(_) => params.failsafe,
        SeasonEnd::Length(_) => SAISL_FAILSAFE,
    };
    StationChange {
        tthrs: bound(d_tthrs, params.failsafe),
        season_end: bound(d_end, end_limit),
    }
}

/// Per-station corrections of one species.
#[derive(Debug, Clone, PartialEq)]
pub struct PhenologyChanges {
    pub species: Species,
    pub tthrs: Vec<f64>,
    pub season_end: Vec<f64>,
    pub season_end_field: PhenologyFieldSet,
}

impl PhenologyChanges {
    /// The two corrected fields with their per-station changes.
    pub fn fields(&self) -> [(FieldId, &[f64]); 2] {
        [
            (self.species.field(FieldKind::Tthrs), self.tthrs.as_slice()),
            (self.season_end_field.field(), self.season_end.as_slice()),
        ]
    }
}

/// Computes the phenology corrections of `data.species` at every station.
pub fn compute(
    data: &ObsModData,
    grid: &GridSnapshot,
    params: &SpeciesParams,
) -> CalibrationResult<PhenologyChanges> {
    let species = data.species;
    let field_set = species.phenology_field_set();
    let tthrs = grid.pollen_field(species.field(FieldKind::Tthrs))?;
    let end = grid.pollen_field(field_set.field())?;
    let saisn = grid.pollen_field(species.field(FieldKind::Saisn))?;
    let ctsum = grid.pollen_field(species.field(FieldKind::Ctsum))?;
    let t2m = grid
        .field(T_2M)
        .ok_or_else(|| CalibrationError::MissingMandatoryFields {
            location: "grid snapshot".to_string(),
            fields: vec![T_2M.to_string()],
        })?;
    let date = grid.calibration_date();

    let mut changes = PhenologyChanges {
        species,
        tthrs: Vec::with_capacity(data.n_stations()),
        season_end: Vec::with_capacity(data.n_stations()),
        season_end_field: field_set,
    };

    for (station, coord) in data.coords().into_iter().enumerate() {
        let Some(i) = grid.nearest_index(coord) else {
            changes.tthrs.push(0.0);
            changes.season_end.push(0.0);
            continue;
        };
        let season_end = match field_set {
            PhenologyFieldSet::EndThreshold(_) => SeasonEnd::Threshold(end[i]),
            PhenologyFieldSet::SeasonLength(_) => SeasonEnd::Length(end[i]),
        };
        let state = PhenologyState {
            tthrs: tthrs[i],
            season_end,
            saisn: saisn[i],
            ctsum: ctsum[i],
            t2m: t2m[i] - KELVIN_OFFSET,
        };
        let sums = ConcentrationSums {
            last_day: data.obs_sum_last_day(station),
            window: data.obs_sum(station),
        };

        let mut change = station_change(params, &state, sums, date);
        if !change.tthrs.is_finite() || !change.season_end.is_finite() {
            warn!(
                "Non-finite {} phenology change at station {}, ignoring it",
                species, data.stations[station].indicator
            );
            change = StationChange {
                tthrs: 0.0,
                season_end: 0.0,
            };
        }
        debug!(
            station = %data.stations[station].indicator,
            sum_24h = sums.last_day,
            sum_window = sums.window,
            d_tthrs = change.tthrs,
            d_end = change.season_end,
            "{} phenology",
            species
        );
        changes.tthrs.push(change.tthrs);
        changes.season_end.push(change.season_end);
    }

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn alnu() -> SpeciesParams {
        SpeciesParams::defaults(Species::Alnu)
    }

    #[test]
    fn test_early_high_concentration_pulls_thresholds_down() {
        let state = PhenologyState {
            tthrs: 500.0,
            season_end: SeasonEnd::Threshold(5000.0),
            saisn: 0.0,
            ctsum: 300.0,
            t2m: 5.0,
        };
        let sums = ConcentrationSums {
            last_day: 200.0,
            window: 500.0,
        };
        let change = station_change(&alnu(), &state, sums, 60.0);
        assert_relative_eq!(change.tthrs, -200.0);
        assert_relative_eq!(change.season_end, -200.0);
    }

    #[test]
    fn test_late_low_concentration_nudges_up() {
        let state = PhenologyState {
            tthrs: 100.0,
            season_end: SeasonEnd::Threshold(10_000.0),
            saisn: 2.0,
            ctsum: 300.0,
            t2m: 4.0,
        };
        let sums = ConcentrationSums {
            last_day: 10.0,
            window: 20.0,
        };
        // 4 * (60 - 14)
        let change = station_change(&alnu(), &state, sums, 60.0);
        assert_relative_eq!(change.tthrs, 184.0);
        assert_relative_eq!(change.season_end, 184.0);
    }

    #[test]
    fn test_bound_is_symmetric() {
        assert_eq!(bound(2000.0, 1000.0), 1000.0);
        assert_eq!(bound(-2000.0, 1000.0), -1000.0);
        assert_eq!(bound(-5.0, 1000.0), -5.0);
        assert!(bound(f64::NAN, 1000.0).is_nan());
    }
}
