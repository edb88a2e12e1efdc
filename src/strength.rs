//! Hourly correction factors for the emission strength (`tune`).

use tracing::{debug, warn};

use crate::atab::ObsModData;
use crate::constants::{SpeciesParams, LAST_DAY_HOURS, TUNE_NEUTRAL};
use crate::errors::{CalibrationError, CalibrationResult};
use crate::grid::GridSnapshot;
use crate::species::FieldKind;

/// Multiplicative change of `tune` at one station for one hourly cycle.
///
/// With an active season the factor either relaxes `tune` towards neutral
/// (weak signal at the station or in the model) or moves the model towards
/// the observed/modelled ratio. Both are spread over 24 hourly applications.
pub fn station_tune_change(
    params: &SpeciesParams,
    saisn: f64,
    tune: f64,
    sum_obs: f64,
    sum_mod: f64,
) -> f64 {
    let hourly = 1.0 / LAST_DAY_HOURS as f64;
    let threshold = params.thr_con_120;
    if saisn > 0.0 && (sum_obs <= threshold || sum_mod <= threshold) {
        (TUNE_NEUTRAL / tune).powf(hourly)
    } else if saisn > 0.0 && sum_obs > threshold && sum_mod > threshold {
        (sum_obs / sum_mod).powf(hourly)
    } else {
        TUNE_NEUTRAL
    }
}

/// Computes the `tune` change factor of `data.species` at every station.
pub fn compute(
    data: &ObsModData,
    grid: &GridSnapshot,
    params: &SpeciesParams,
) -> CalibrationResult<Vec<f64>> {
    let species = data.species;
    if data.model.is_none() {
        return Err(CalibrationError::MissingModelData { species });
    }
    let tune = grid.pollen_field(species.field(FieldKind::Tune))?;
    let saisn = grid.pollen_field(species.field(FieldKind::Saisn))?;

    let mut changes = Vec::with_capacity(data.n_stations());
    for (station, coord) in data.coords().into_iter().enumerate() {
        let (Some(i), Some(sum_mod)) = (grid.nearest_index(coord), data.model_sum(station)) else {
            changes.push(TUNE_NEUTRAL);
            continue;
        };
        let sum_obs = data.obs_sum(station);
        let mut change = station_tune_change(params, saisn[i], tune[i], sum_obs, sum_mod);
        if !change.is_finite() {
            warn!(
                "Non-finite {} tune change at station {} (tune {}), keeping tune",
                species, data.stations[station].indicator, tune[i]
            );
            change = TUNE_NEUTRAL;
        }
        debug!(
            station = %data.stations[station].indicator,
            sum_obs,
            sum_mod,
            saisn = saisn[i],
            tune = tune[i],
            change,
            "{} strength",
            species
        );
        changes.push(change);
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::species::Species;
    use approx::assert_relative_eq;

    #[test]
    fn test_weak_signal_relaxes_towards_neutral() {
        let params = SpeciesParams::defaults(Species::Betu);
        let change = station_tune_change(&params, 10.0, 2.0, 100.0, 5000.0);
        assert_relative_eq!(change, 0.5_f64.powf(1.0 / 24.0));
        // 24 hourly applications bring tune back to 1.
        assert_relative_eq!(2.0 * change.powi(24), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_inactive_season_is_neutral() {
        let params = SpeciesParams::defaults(Species::Alnu);
        assert_eq!(station_tune_change(&params, 0.0, 0.3, 5000.0, 10.0), 1.0);
        assert_eq!(station_tune_change(&params, -1.0, 2.0, 0.0, 0.0), 1.0);
    }
}
