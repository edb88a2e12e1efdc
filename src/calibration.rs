//! The two calibration cycles: read the snapshot, evaluate the rules per
//! species, interpolate the station corrections and write the new snapshot.

use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::atab::{self, ObsModData};
use crate::config::{Config, OperationPaths};
use crate::constants::{SpeciesConstants, TUNE_NEUTRAL};
use crate::errors::{CalibrationError, CalibrationResult, FieldStoreError};
use crate::field_store::{advance_time, FieldMessage, FieldSet, FieldStore, JsonFieldStore};
use crate::grid::GridSnapshot;
use crate::interpolation::{self, ClampBounds, CombineMode};
use crate::phenology;
use crate::species::{FieldId, FieldKind, Operation, Species, CLAT, CLON, T_2M};
use crate::strength;

/// What a calibration cycle did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationSummary {
    /// Species for which corrections were computed.
    pub species_processed: Vec<Species>,
    /// Species present in the snapshot without station observations.
    pub species_skipped: Vec<Species>,
    /// Names of the fields replaced in the output snapshot.
    pub fields_updated: Vec<String>,
}

pub struct Calibrator<S: FieldStore> {
    config: Config,
    constants: SpeciesConstants,
    store: S,
}

impl Calibrator<JsonFieldStore> {
    pub fn new(config: Config) -> CalibrationResult<Self> {
        Self::with_store(config, JsonFieldStore::new())
    }
}

impl<S: FieldStore> Calibrator<S> {
    pub fn with_store(config: Config, store: S) -> CalibrationResult<Self> {
        let constants = SpeciesConstants::with_overrides(&config.species_constants)?;
        Ok(Self {
            config,
            constants,
            store,
        })
    }

    /// Replaces the constant table, e.g. to run with thresholds of another revision.
    pub fn with_constants(mut self, constants: SpeciesConstants) -> Self {
        self.constants = constants;
        self
    }

    pub fn constants(&self) -> &SpeciesConstants {
        &self.constants
    }

    /// Recalibrates the season start/end thresholds (season length for grass).
    pub fn update_phenology(&self) -> CalibrationResult<CalibrationSummary> {
        let paths = self.config.paths_for(Operation::Phenology)?;
        self.run(Operation::Phenology, &paths)
    }

    /// Recalibrates the emission strength factor `tune`.
    pub fn update_strength(&self) -> CalibrationResult<CalibrationSummary> {
        let paths = self.config.paths_for(Operation::Strength)?;
        self.run(Operation::Strength, &paths)
    }

    fn run(&self, operation: Operation, paths: &OperationPaths) -> CalibrationResult<CalibrationSummary> {
        info!("Starting {}", operation.name());
        self.constants.log_table();

        let grid = self.load_grid(operation, paths)?;
        info!(
            "Loaded {} grid points valid at {}",
            grid.len(),
            grid.valid_time()
        );

        let mut summary = CalibrationSummary::default();
        let mut updated: HashMap<String, Vec<f64>> = HashMap::new();

        for species in grid.present_species() {
            let data = atab::read_atab(
                species,
                &paths.station_obs_file,
                paths.station_mod_file.as_deref(),
                self.config.max_miss_stns,
            )?;
            if data.is_empty() {
                warn!(
                    "No {} observations in {}, skipping species",
                    species,
                    paths.station_obs_file.display()
                );
                summary.species_skipped.push(species);
                continue;
            }
            if let Some(model) = &data.model {
                if model.data.nrows() == 0 {
                    warn!(
                        "No modelled {} concentrations in the model file, skipping species",
                        species
                    );
                    summary.species_skipped.push(species);
                    continue;
                }
            }

            let params = self.constants.get(species);
            let corrections: Vec<(FieldId, Vec<f64>, CombineMode, ClampBounds)> = match operation {
                Operation::Phenology => {
                    let changes = phenology::compute(&data, &grid, params)?;
                    changes
                        .fields()
                        .into_iter()
                        .map(|(field, values)| {
                            (field, values.to_vec(), CombineMode::Sum, ClampBounds::unbounded())
                        })
                        .collect()
                }
                Operation::Strength => {
                    let changes = strength::compute(&data, &grid, params)?;
                    vec![(
                        species.field(FieldKind::Tune),
                        changes,
                        CombineMode::Multiply,
                        ClampBounds::tune(params),
                    )]
                }
            };

            for (field, values, mode, bounds) in corrections {
                if let Some(interpolated) = spread(&data, &grid, field, &values, mode, bounds)? {
                    updated.insert(field.storage_key(), interpolated);
                    summary.fields_updated.push(field.storage_key());
                }
            }
            summary.species_processed.push(species);
        }

        self.store.write_all_fields(
            &paths.pov_infile,
            &paths.pov_outfile,
            &updated,
            self.config.hour_incr,
        )?;
        info!(
            "Wrote {} with {} updated fields",
            paths.pov_outfile.display(),
            updated.len()
        );
        Ok(summary)
    }

    /// Builds the snapshot the rules read from: grid coordinates, the pollen
    /// fields of the operation and, for phenology, the 2m temperature.
    fn load_grid(&self, operation: Operation, paths: &OperationPaths) -> CalibrationResult<GridSnapshot> {
        let constants = self.store.read_all_fields(&paths.const_file)?;
        let lon = constants.require(CLON, &paths.const_file)?.values.clone();
        let lat = constants.require(CLAT, &paths.const_file)?.values.clone();

        let pollen = self.store.read_all_fields(&paths.pov_infile)?;
        let calibrated: Vec<_> = pollen
            .messages
            .iter()
            .filter(|m| FieldId::parse(&m.short_name).is_some_and(|id| operation.uses(id)))
            .collect();

        let t2m = match &paths.t2m_file {
            Some(path) => {
                let fields = self.store.read_all_fields(path)?;
                let message = fields.get(T_2M).cloned().ok_or_else(|| {
                    CalibrationError::MissingMandatoryFields {
                        location: path.display().to_string(),
                        fields: vec![T_2M.to_string()],
                    }
                })?;
                Some((message, path.as_path()))
            }
            None => None,
        };

        let valid_time = match &t2m {
            Some((message, path)) => message.valid_time(path)?,
            None => reference_time(&pollen, &calibrated, &paths.pov_infile)?,
        };
        let hour_incr = self.config.hour_incr;
        let valid_time = advance_time(valid_time, hour_incr).ok_or_else(|| FieldStoreError::TimeOverflow {
            field: "snapshot validity time".to_string(),
            hours: hour_incr,
        })?;

        let mut grid = GridSnapshot::new(lat, lon, valid_time)?;
        for message in calibrated {
            grid.insert_field(message.short_name.clone(), message.values.clone())?;
        }
        if let Some((message, _)) = t2m {
            grid.insert_field(T_2M, message.values)?;
        }

        grid.check_mandatory_fields(operation, &paths.pov_infile.display().to_string())?;
        let present: Vec<&str> = grid.present_species().iter().map(|s| s.code()).collect();
        info!("Species in {}: {:?}", paths.pov_infile.display(), present);
        Ok(grid)
    }
}

/// Validity time of the pollen snapshot, taken from the calibrated fields when there are any.
fn reference_time(
    pollen: &FieldSet,
    calibrated: &[&FieldMessage],
    path: &Path,
) -> Result<NaiveDateTime, FieldStoreError> {
    let message = calibrated
        .first()
        .copied()
        .or_else(|| pollen.messages.first())
        .ok_or_else(|| FieldStoreError::Empty {
            path: path.to_path_buf(),
        })?;
    message.valid_time(path)
}

/// Interpolates station corrections onto the grid. Additive corrections that
/// are zero at every station leave the field untouched.
fn spread(
    data: &ObsModData,
    grid: &GridSnapshot,
    field: FieldId,
    values: &[f64],
    mode: CombineMode,
    bounds: ClampBounds,
) -> CalibrationResult<Option<Vec<f64>>> {
    match mode {
        CombineMode::Sum => {
            let non_zero = values.iter().filter(|v| **v != 0.0).count();
            info!("Number of non-zero values in {}: {}", field, non_zero);
            if non_zero == 0 {
                return Ok(None);
            }
        }
        CombineMode::Multiply => {
            let changed = values.iter().filter(|v| **v != TUNE_NEUTRAL).count();
            info!(
                "{}: {} of {} stations away from neutral",
                field,
                changed,
                values.len()
            );
        }
    }
    interpolation::interpolate(values, grid, field, &data.coords(), mode, bounds).map(Some)
}

pub fn update_phenology(config: &Config) -> CalibrationResult<CalibrationSummary> {
    Calibrator::new(config.clone())?.update_phenology()
}

pub fn update_strength(config: &Config) -> CalibrationResult<CalibrationSummary> {
    Calibrator::new(config.clone())?.update_strength()
}
