//! Storage of gridded field snapshots.
//!
//! The calibration only talks to [`FieldStore`]. [`JsonFieldStore`] keeps a
//! snapshot as a JSON document of messages, one per field:
//!
//! ```json
//! {"messages": [{"short_name": "ALNUtune", "data_date": 20240301, "hour": 12, "values": [1.0, 0.9]}]}
//! ```

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

use crate::errors::FieldStoreError;

/// One gridded field with its validity time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FieldMessage {
    pub short_name: String,
    /// Validity date as `YYYYMMDD`.
    pub data_date: u32,
    pub hour: u32,
    pub values: Vec<f64>,
}

impl FieldMessage {
    pub fn valid_time(&self, path: &Path) -> Result<NaiveDateTime, FieldStoreError> {
        let year = (self.data_date / 10_000) as i32;
        let month = self.data_date / 100 % 100;
        let day = self.data_date % 100;
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(self.hour, 0, 0))
            .ok_or_else(|| FieldStoreError::InvalidTimestamp {
                path: path.to_path_buf(),
                field: self.short_name.clone(),
                data_date: self.data_date,
                hour: self.hour,
            })
    }

    /// Validity time moved by `hours`; fails instead of overflowing the calendar.
    pub fn advanced_time(&self, path: &Path, hours: i64) -> Result<NaiveDateTime, FieldStoreError> {
        let time = self.valid_time(path)?;
        advance_time(time, hours).ok_or_else(|| FieldStoreError::TimeOverflow {
            field: self.short_name.clone(),
            hours,
        })
    }

    pub fn set_valid_time(&mut self, time: NaiveDateTime) {
        self.data_date = time.year() as u32 * 10_000 + time.month() * 100 + time.day();
        self.hour = time.hour();
    }
}

/// `time + hours`, or `None` when the result is not representable.
pub fn advance_time(time: NaiveDateTime, hours: i64) -> Option<NaiveDateTime> {
    Duration::try_hours(hours).and_then(|d| time.checked_add_signed(d))
}

/// All messages of one snapshot file, in file order.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct FieldSet {
    pub messages: Vec<FieldMessage>,
}

impl FieldSet {
    pub fn get(&self, name: &str) -> Option<&FieldMessage> {
        self.messages.iter().find(|m| m.short_name == name)
    }

    pub fn require(&self, name: &str, path: &Path) -> Result<&FieldMessage, FieldStoreError> {
        self.get(name).ok_or_else(|| FieldStoreError::MissingField {
            path: path.to_path_buf(),
            field: name.to_string(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(|m| m.short_name.as_str())
    }
}

pub trait FieldStore {
    fn read_all_fields(&self, path: &Path) -> Result<FieldSet, FieldStoreError>;

    /// Copies every field of `path_in` to `path_out`, replacing the ones named in
    /// `updated` and advancing all validity times by `hour_incr` hours. Grid points
    /// that are exactly zero in the input stay zero.
    fn write_all_fields(
        &self,
        path_in: &Path,
        path_out: &Path,
        updated: &HashMap<String, Vec<f64>>,
        hour_incr: i64,
    ) -> Result<(), FieldStoreError>;
}

/// Replaces `old` by `new`, keeping masked (zero) points.
pub fn merge_preserving_zeros(old: &[f64], new: &[f64]) -> Vec<f64> {
    old.iter()
        .zip(new)
        .map(|(o, n)| if *o == 0.0 { 0.0 } else { *n })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFieldStore;

impl JsonFieldStore {
    pub fn new() -> Self {
        Self
    }
}

impl FieldStore for JsonFieldStore {
    fn read_all_fields(&self, path: &Path) -> Result<FieldSet, FieldStoreError> {
        let file = File::open(path).map_err(|e| FieldStoreError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let fields: FieldSet = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            FieldStoreError::JsonParseError {
                path: path.to_path_buf(),
                source: e,
            }
        })?;
        debug!("Read {} fields from {}", fields.messages.len(), path.display());
        Ok(fields)
    }

    fn write_all_fields(
        &self,
        path_in: &Path,
        path_out: &Path,
        updated: &HashMap<String, Vec<f64>>,
        hour_incr: i64,
    ) -> Result<(), FieldStoreError> {
        let mut fields = self.read_all_fields(path_in)?;

        for message in &mut fields.messages {
            let time = message.advanced_time(path_in, hour_incr)?;
            message.set_valid_time(time);

            if let Some(values) = updated.get(&message.short_name) {
                if values.len() != message.values.len() {
                    return Err(FieldStoreError::GridSizeMismatch {
                        field: message.short_name.clone(),
                        expected: message.values.len(),
                        found: values.len(),
                    });
                }
                message.values = merge_preserving_zeros(&message.values, values);
            }
        }

        for name in updated.keys() {
            if fields.get(name).is_none() {
                return Err(FieldStoreError::MissingField {
                    path: path_in.to_path_buf(),
                    field: name.clone(),
                });
            }
        }

        let file = File::create(path_out).map_err(|e| FieldStoreError::IoError {
            path: path_out.to_path_buf(),
            source: e,
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &fields).map_err(|e| FieldStoreError::JsonWriteError {
            path: path_out.to_path_buf(),
            source: e,
        })?;
        writer.flush().map_err(|e| FieldStoreError::IoError {
            path: path_out.to_path_buf(),
            source: e,
        })?;

        debug!(
            "Wrote {} fields ({} updated) to {}",
            fields.messages.len(),
            updated.len(),
            path_out.display()
        );
        Ok(())
    }
}
