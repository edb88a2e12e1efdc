use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::species::Species;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading config file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse JSON configuration in {path}: {source}")]
    JsonParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Configuration file not found at {path}")]
    NotFound { path: PathBuf },
    #[error("Configuration key '{key}' is required for {operation}")]
    MissingKey {
        key: &'static str,
        operation: &'static str,
    },
    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Error, Debug)]
pub enum AtabError {
    #[error("IO error reading station file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Station file {path} has no '{key}' header line")]
    MissingHeader { path: PathBuf, key: &'static str },
    #[error("Station file {path} has no column '{column}'")]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("Invalid number '{value}' in {path} at line {line}")]
    InvalidNumber {
        path: PathBuf,
        line: usize,
        value: String,
    },
    #[error("Invalid timestamp '{value}' in {path} at line {line}")]
    InvalidTimestamp {
        path: PathBuf,
        line: usize,
        value: String,
    },
    #[error("Row at line {line} of {path} has {found} columns, expected {expected}")]
    RowWidth {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },
}

#[derive(Error, Debug)]
pub enum FieldStoreError {
    #[error("IO error accessing field file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse field file {path}: {source}")]
    JsonParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to write field file {path}: {source}")]
    JsonWriteError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Field '{field}' not found in {path}")]
    MissingField { path: PathBuf, field: String },
    #[error("Field file {path} contains no messages")]
    Empty { path: PathBuf },
    #[error("Field '{field}' has {found} values, grid has {expected} points")]
    GridSizeMismatch {
        field: String,
        expected: usize,
        found: usize,
    },
    #[error("Advancing field '{field}' by {hours} hours leaves the supported calendar range")]
    TimeOverflow { field: String, hours: i64 },
    #[error("Field '{field}' in {path} has invalid validity date {data_date} hour {hour}")]
    InvalidTimestamp {
        path: PathBuf,
        field: String,
        data_date: u32,
        hour: u32,
    },
}

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Station data error: {0}")]
    Atab(#[from] AtabError),
    #[error("Field store error: {0}")]
    FieldStore(#[from] FieldStoreError),
    #[error("Mandatory fields missing from {location}: {fields:?}")]
    MissingMandatoryFields {
        location: String,
        fields: Vec<String>,
    },
    #[error(
        "Station {station} has {missing} of {total} {species} observations missing \
         ({stations_affected} stations affected, {tolerated} tolerated)"
    )]
    StationMissingData {
        species: Species,
        station: String,
        missing: usize,
        total: usize,
        stations_affected: usize,
        tolerated: usize,
    },
    #[error("Station count mismatch in {what}: expected {expected}, found {found}")]
    StationCountMismatch {
        what: String,
        expected: usize,
        found: usize,
    },
    #[error("Model data in {path} contains missing values for {species}")]
    MissingModelValues { path: PathBuf, species: Species },
    #[error("Strength calibration for {species} needs modelled concentrations")]
    MissingModelData { species: Species },
}

pub type CalibrationResult<T> = Result<T, CalibrationError>;
