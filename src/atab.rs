//! Reader for the ATAB station tables holding hourly pollen concentrations.
//!
//! An ATAB file starts with a free-form header. The calibration uses four marked
//! lines from it (`Latitude`, `Longitude`, `Missing_value_code`, `Indicator`) and
//! stops at the column header line that starts with `PARAMETER`. Every row after
//! that holds one hour for one species: descriptor columns, a timestamp split
//! over five columns (`YYYY MM DD hh mm`) and one value per station.

use chrono::{NaiveDate, NaiveDateTime};
use ndarray::{Array2, Axis};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::constants::{LAST_DAY_HOURS, MAX_MISSING_FRACTION, MISSING_TOLERANCE, UNREPAIRABLE_FILL};
use crate::errors::{AtabError, CalibrationError, CalibrationResult};
use crate::grid::Coord;
use crate::species::Species;

const PARAMETER_COLUMN: &str = "PARAMETER";
const TIMESTAMP_COLUMNS: usize = 5;
/// Width of the label in front of the model file's station indicators.
const MODEL_INDICATOR_OFFSET: usize = 29;
const MODEL_INDICATOR_SEPARATOR: &str = "         ";

/// Column layout of a station table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtabLayout {
    /// `PARAMETER YYYY MM DD hh mm <values>`, tab-separated indicators.
    Observation,
    /// Three descriptor columns before the timestamp, fixed-width indicators.
    Model,
}

impl AtabLayout {
    fn timestamp_start(self) -> usize {
        match self {
            AtabLayout::Observation => 1,
            AtabLayout::Model => 3,
        }
    }

    fn values_start(self) -> usize {
        self.timestamp_start() + TIMESTAMP_COLUMNS
    }

    fn split_indicators(self, rest: &str) -> Vec<String> {
        match self {
            AtabLayout::Observation => rest.split('\t').map(|s| s.trim().to_string()).collect(),
            AtabLayout::Model => rest
                .split(MODEL_INDICATOR_SEPARATOR)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub indicator: String,
    pub coord: Coord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtabHeader {
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub missing_value: f64,
    pub indicators: Vec<String>,
    /// Zero-based line number of the `PARAMETER` column header.
    pub column_line: usize,
    pub columns: Vec<String>,
}

/// Rows of one species from a station table.
#[derive(Debug, Clone, PartialEq)]
pub struct AtabTable {
    pub timestamps: Vec<NaiveDateTime>,
    /// `[hours, stations]`
    pub values: Array2<f64>,
}

/// Modelled concentrations aligned to the observation stations.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSeries {
    /// `[hours, model stations]`
    pub data: Array2<f64>,
    /// Model column for each observation station.
    pub station_index: Vec<usize>,
}

/// Observations (and optionally model values) of one species at the stations.
#[derive(Debug, Clone, PartialEq)]
pub struct ObsModData {
    pub species: Species,
    pub stations: Vec<Station>,
    pub timestamps: Vec<NaiveDateTime>,
    /// `[hours, stations]`, repaired of missing values.
    pub data_obs: Array2<f64>,
    pub missing_value: f64,
    pub model: Option<ModelSeries>,
}

impl ObsModData {
    pub fn n_stations(&self) -> usize {
        self.stations.len()
    }

    /// No rows for the species in the observation file.
    pub fn is_empty(&self) -> bool {
        self.data_obs.nrows() == 0
    }

    pub fn coords(&self) -> Vec<Coord> {
        self.stations.iter().map(|s| s.coord).collect()
    }

    /// Sum over the whole observation window.
    pub fn obs_sum(&self, station: usize) -> f64 {
        self.data_obs.column(station).sum()
    }

    /// Sum over the last `hours` rows of the observation window.
    pub fn obs_sum_last(&self, station: usize, hours: usize) -> f64 {
        let rows = self.data_obs.nrows();
        let start = rows.saturating_sub(hours);
        self.data_obs.column(station).iter().skip(start).sum()
    }

    pub fn obs_sum_last_day(&self, station: usize) -> f64 {
        self.obs_sum_last(station, LAST_DAY_HOURS)
    }

    /// Sum of the modelled series matched to an observation station.
    pub fn model_sum(&self, station: usize) -> Option<f64> {
        let model = self.model.as_ref()?;
        let column = *model.station_index.get(station)?;
        Some(model.data.column(column).sum())
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> AtabError + '_ {
    move |source| AtabError::IoError {
        path: path.to_path_buf(),
        source,
    }
}

fn parse_number(path: &Path, line: usize, value: &str) -> Result<f64, AtabError> {
    value.trim().parse::<f64>().map_err(|_| AtabError::InvalidNumber {
        path: path.to_path_buf(),
        line: line + 1,
        value: value.to_string(),
    })
}

fn parse_numbers(path: &Path, line: usize, rest: &str) -> Result<Vec<f64>, AtabError> {
    rest.split_whitespace()
        .map(|v| parse_number(path, line, v))
        .collect()
}

/// Text after a `Key:` label.
fn label_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(key)?;
    let rest = rest.trim_start_matches(' ');
    Some(rest.strip_prefix(':').unwrap_or(rest))
}

pub fn read_header(path: &Path, content: &str, layout: AtabLayout) -> Result<AtabHeader, AtabError> {
    let mut latitudes = None;
    let mut longitudes = None;
    let mut missing_value = None;
    let mut indicators = None;

    for (n, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.starts_with(PARAMETER_COLUMN) {
            let columns = line.split_whitespace().map(str::to_string).collect();
            return Ok(AtabHeader {
                latitudes: latitudes.unwrap_or_default(),
                longitudes: longitudes.unwrap_or_default(),
                missing_value: missing_value.ok_or_else(|| AtabError::MissingHeader {
                    path: path.to_path_buf(),
                    key: "Missing_value_code",
                })?,
                indicators: indicators.ok_or_else(|| AtabError::MissingHeader {
                    path: path.to_path_buf(),
                    key: "Indicator",
                })?,
                column_line: n,
                columns,
            });
        }
        let with_coords = layout == AtabLayout::Observation;
        if let Some(rest) = label_value(line, "Latitude").filter(|_| with_coords) {
            latitudes = Some(parse_numbers(path, n, rest)?);
        } else if let Some(rest) = label_value(line, "Longitude").filter(|_| with_coords) {
            longitudes = Some(parse_numbers(path, n, rest)?);
        } else if let Some(rest) = label_value(line, "Missing_value_code") {
            missing_value = Some(parse_number(path, n, rest)?);
        } else if line.starts_with("Indicator") {
            let rest = match layout {
                AtabLayout::Observation => label_value(line, "Indicator").unwrap_or_default(),
                AtabLayout::Model => line.get(MODEL_INDICATOR_OFFSET..).unwrap_or_default(),
            };
            indicators = Some(layout.split_indicators(rest.trim()));
        }
    }

    Err(AtabError::MissingHeader {
        path: path.to_path_buf(),
        key: PARAMETER_COLUMN,
    })
}

fn parse_timestamp(path: &Path, line: usize, fields: &[&str]) -> Result<NaiveDateTime, AtabError> {
    let invalid = || AtabError::InvalidTimestamp {
        path: path.to_path_buf(),
        line: line + 1,
        value: fields.join(" "),
    };
    let parts: Vec<u32> = fields
        .iter()
        .map(|f| f.parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|_| invalid())?;
    let [year, month, day, hour, minute] = parts[..] else {
        return Err(invalid());
    };
    let year = i32::try_from(year).map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .ok_or_else(invalid)
}

/// Rows of `species` below the column header.
pub fn read_table(
    path: &Path,
    content: &str,
    header: &AtabHeader,
    layout: AtabLayout,
    species: Species,
) -> Result<AtabTable, AtabError> {
    let parameter = header
        .columns
        .iter()
        .position(|c| c == PARAMETER_COLUMN)
        .ok_or_else(|| AtabError::MissingColumn {
            path: path.to_path_buf(),
            column: PARAMETER_COLUMN,
        })?;
    let n_stations = header.indicators.len();
    let width = layout.values_start() + n_stations;
    let ts_start = layout.timestamp_start();

    let mut timestamps = Vec::new();
    let mut flat = Vec::new();
    for (n, raw) in content.lines().enumerate().skip(header.column_line + 1) {
        let fields: Vec<&str> = raw.split_whitespace().collect();
        if fields.is_empty() || fields.get(parameter) != Some(&species.code()) {
            continue;
        }
        if fields.len() != width {
            return Err(AtabError::RowWidth {
                path: path.to_path_buf(),
                line: n + 1,
                expected: width,
                found: fields.len(),
            });
        }
        timestamps.push(parse_timestamp(path, n, &fields[ts_start..ts_start + TIMESTAMP_COLUMNS])?);
        for value in &fields[layout.values_start()..] {
            flat.push(parse_number(path, n, value)?);
        }
    }

    let mut values = Array2::zeros((timestamps.len(), n_stations));
    for (i, mut row) in values.axis_iter_mut(Axis(0)).enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = flat[i * n_stations + j];
        }
    }
    Ok(AtabTable { timestamps, values })
}

/// Model column of every observation station also present in the model file,
/// in observation order.
pub fn model_station_index(obs_indicators: &[String], mod_indicators: &[String]) -> Vec<usize> {
    obs_indicators
        .iter()
        .filter_map(|ind| mod_indicators.iter().position(|m| m == ind))
        .collect()
}

fn is_missing(value: f64, missing_value: f64) -> bool {
    (value - missing_value).abs() < MISSING_TOLERANCE
}

/// Outcome of the missing-value repair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissingReport {
    /// Stations whose gaps were filled with the station mean.
    pub imputed: Vec<String>,
    /// Stations with too many gaps, replaced by a constant series.
    pub replaced: Vec<String>,
}

/// Repairs missing observations in place.
///
/// A station missing less than half of its hours gets the gaps filled with the
/// mean of its valid hours. Stations missing more are unrepairable: up to
/// `max_miss_stns` of them are replaced by a constant series, more abort the run.
pub fn treat_missing(
    species: Species,
    data: &mut Array2<f64>,
    missing_value: f64,
    indicators: &[String],
    max_miss_stns: usize,
) -> CalibrationResult<MissingReport> {
    let hours = data.nrows();
    let mut report = MissingReport::default();
    if hours == 0 {
        return Ok(report);
    }

    let mut unrepairable = Vec::new();
    for (station, column) in data.axis_iter(Axis(1)).enumerate() {
        let missing = column.iter().filter(|v| is_missing(**v, missing_value)).count();
        if missing as f64 / hours as f64 >= MAX_MISSING_FRACTION {
            unrepairable.push((station, missing));
        }
    }

    let name = |station: usize| {
        indicators
            .get(station)
            .cloned()
            .unwrap_or_else(|| format!("#{}", station))
    };

    if unrepairable.len() > max_miss_stns {
        let (station, missing) = unrepairable[0];
        return Err(CalibrationError::StationMissingData {
            species,
            station: name(station),
            missing,
            total: hours,
            stations_affected: unrepairable.len(),
            tolerated: max_miss_stns,
        });
    }

    for (station, mut column) in data.axis_iter_mut(Axis(1)).enumerate() {
        let (valid_sum, valid_count) = column
            .iter()
            .filter(|v| !is_missing(**v, missing_value))
            .fold((0.0_f64, 0usize), |(s, c), v| (s + v, c + 1));
        let missing = hours - valid_count;
        if missing == 0 {
            continue;
        }

        if unrepairable.iter().any(|(s, _)| *s == station) {
            warn!(
                "Station {} has {} of {} {} observations missing, replacing series with {}",
                name(station),
                missing,
                hours,
                species,
                UNREPAIRABLE_FILL
            );
            column.fill(UNREPAIRABLE_FILL);
            report.replaced.push(name(station));
        } else {
            let mean = valid_sum / valid_count as f64;
            debug!(
                "Station {} has {} missing {} observations, imputing mean {:.3}",
                name(station),
                missing,
                species,
                mean
            );
            column
                .iter_mut()
                .filter(|v| is_missing(**v, missing_value))
                .for_each(|v| *v = mean);
            report.imputed.push(name(station));
        }
    }

    Ok(report)
}

fn read_file(path: &Path) -> Result<String, AtabError> {
    fs::read_to_string(path).map_err(io_error(path))
}

/// Reads the observations of `species` and, when given, the matching model values.
pub fn read_atab(
    species: Species,
    obs_path: &Path,
    mod_path: Option<&Path>,
    max_miss_stns: usize,
) -> CalibrationResult<ObsModData> {
    let content = read_file(obs_path)?;
    let header = read_header(obs_path, &content, AtabLayout::Observation)?;
    let n_stations = header.indicators.len();
    for (what, found) in [
        ("latitudes", header.latitudes.len()),
        ("longitudes", header.longitudes.len()),
    ] {
        if found != n_stations {
            return Err(CalibrationError::StationCountMismatch {
                what: format!("{} of {}", what, obs_path.display()),
                expected: n_stations,
                found,
            });
        }
    }
    let table = read_table(obs_path, &content, &header, AtabLayout::Observation, species)?;
    debug!(
        "Read {} hours of {} observations at {} stations from {}",
        table.timestamps.len(),
        species,
        n_stations,
        obs_path.display()
    );
    if let Some(end) = table.timestamps.last() {
        info!("{} observation window ends at {}", species, end);
    }

    let model = match mod_path {
        Some(path) => Some(read_model(species, path, &header.indicators, n_stations)?),
        None => None,
    };

    let mut data_obs = table.values;
    let report = treat_missing(
        species,
        &mut data_obs,
        header.missing_value,
        &header.indicators,
        max_miss_stns,
    )?;
    if !report.imputed.is_empty() {
        info!(
            "Imputed missing {} observations at {} stations",
            species,
            report.imputed.len()
        );
    }

    let stations = header
        .indicators
        .iter()
        .zip(header.latitudes.iter().zip(&header.longitudes))
        .map(|(indicator, (lat, lon))| Station {
            indicator: indicator.clone(),
            coord: Coord::new(*lat, *lon),
        })
        .collect();

    Ok(ObsModData {
        species,
        stations,
        timestamps: table.timestamps,
        data_obs,
        missing_value: header.missing_value,
        model,
    })
}

fn read_model(
    species: Species,
    path: &Path,
    obs_indicators: &[String],
    n_obs_stations: usize,
) -> CalibrationResult<ModelSeries> {
    let content = read_file(path)?;
    let header = read_header(path, &content, AtabLayout::Model)?;
    let station_index = model_station_index(obs_indicators, &header.indicators);
    if station_index.len() != n_obs_stations {
        return Err(CalibrationError::StationCountMismatch {
            what: format!("stations matched in {}", path.display()),
            expected: n_obs_stations,
            found: station_index.len(),
        });
    }

    let table = read_table(path, &content, &header, AtabLayout::Model, species)?;
    if table.values.iter().any(|v| is_missing(*v, header.missing_value)) {
        return Err(CalibrationError::MissingModelValues {
            path: PathBuf::from(path),
            species,
        });
    }
    debug!(
        "Read {} hours of modelled {} at {} stations from {}",
        table.timestamps.len(),
        species,
        header.indicators.len(),
        path.display()
    );

    Ok(ModelSeries {
        data: table.values,
        station_index,
    })
}
