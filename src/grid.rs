//! In-memory grid snapshot and nearest-point lookups at station locations.

use chrono::{Datelike, NaiveDateTime};
use std::collections::{BTreeSet, HashMap};

use crate::constants::DATE_OFFSET_DAYS;
use crate::errors::{CalibrationError, CalibrationResult, FieldStoreError};
use crate::species::{FieldId, Operation, Species};

/// Geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Gridded fields sharing one set of grid-point coordinates and one validity time.
#[derive(Debug, Clone)]
pub struct GridSnapshot {
    lat: Vec<f64>,
    lon: Vec<f64>,
    fields: HashMap<String, Vec<f64>>,
    valid_time: NaiveDateTime,
}

impl GridSnapshot {
    pub fn new(
        lat: Vec<f64>,
        lon: Vec<f64>,
        valid_time: NaiveDateTime,
    ) -> Result<Self, FieldStoreError> {
        if lat.len() != lon.len() {
            return Err(FieldStoreError::GridSizeMismatch {
                field: "CLON".to_string(),
                expected: lat.len(),
                found: lon.len(),
            });
        }
        Ok(Self {
            lat,
            lon,
            fields: HashMap::new(),
            valid_time,
        })
    }

    pub fn insert_field(
        &mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<(), FieldStoreError> {
        let name = name.into();
        if values.len() != self.lat.len() {
            return Err(FieldStoreError::GridSizeMismatch {
                field: name,
                expected: self.lat.len(),
                found: values.len(),
            });
        }
        self.fields.insert(name, values);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lat.is_empty()
    }

    pub fn latitudes(&self) -> &[f64] {
        &self.lat
    }

    pub fn longitudes(&self) -> &[f64] {
        &self.lon
    }

    pub fn valid_time(&self) -> NaiveDateTime {
        self.valid_time
    }

    /// Days since Dec 1 of the previous year, counting from the snapshot's validity time.
    pub fn calibration_date(&self) -> f64 {
        f64::from(self.valid_time.ordinal() + DATE_OFFSET_DAYS)
    }

    pub fn field(&self, name: &str) -> Option<&[f64]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    pub fn pollen_field(&self, id: FieldId) -> CalibrationResult<&[f64]> {
        let key = id.storage_key();
        self.field(&key)
            .ok_or_else(|| CalibrationError::MissingMandatoryFields {
                location: "grid snapshot".to_string(),
                fields: vec![key],
            })
    }

    /// Index of the grid point closest to `coord` in squared degree distance.
    /// The first minimiser wins on ties.
    pub fn nearest_index(&self, coord: Coord) -> Option<usize> {
        self.lat
            .iter()
            .zip(&self.lon)
            .map(|(lat, lon)| (lat - coord.lat).powi(2) + (lon - coord.lon).powi(2))
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                Some((_, best_d)) if best_d <= d => best,
                _ => Some((i, d)),
            })
            .map(|(i, _)| i)
    }

    /// Value of `name` at the grid point nearest to `coord`.
    pub fn value_at(&self, name: &str, coord: Coord) -> Option<f64> {
        let values = self.field(name)?;
        self.nearest_index(coord).map(|i| values[i])
    }

    /// Species with at least one calibration field in the snapshot.
    pub fn present_species(&self) -> Vec<Species> {
        let present: BTreeSet<Species> = self
            .fields
            .keys()
            .filter_map(|k| FieldId::parse(k))
            .map(|id| id.species)
            .collect();
        present.into_iter().collect()
    }

    /// Every species with a field in the snapshot must carry all fields the operation reads.
    pub fn check_mandatory_fields(&self, operation: Operation, location: &str) -> CalibrationResult<()> {
        let missing: Vec<String> = self
            .present_species()
            .into_iter()
            .flat_map(|s| operation.required_fields(s))
            .map(|id| id.storage_key())
            .filter(|key| !self.fields.contains_key(key))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CalibrationError::MissingMandatoryFields {
                location: location.to_string(),
                fields: missing,
            })
        }
    }
}
