#[cfg(test)]
pub mod test_helpers {
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use ndarray::Array2;
    use std::fmt::Write as _;
    use std::fs;
    use std::path::{Path, PathBuf};

    use crate::atab::{ModelSeries, ObsModData, Station};
    use crate::field_store::{FieldMessage, FieldSet};
    use crate::grid::Coord;
    use crate::species::Species;

    pub const MISSING: f64 = -9999.0;

    /// First hour of every generated station table.
    pub fn window_start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, 25)
            .unwrap()
            .and_hms_opt(1, 0, 0)
            .unwrap()
    }

    /// A station of a generated table.
    pub struct TestStation {
        pub indicator: &'static str,
        pub lat: f64,
        pub lon: f64,
    }

    /// `hours` rows of one species; `value(hour, station)` gives the cells.
    pub fn species_rows(
        species: Species,
        hours: usize,
        n_stations: usize,
        value: impl Fn(usize, usize) -> f64,
    ) -> Vec<(&'static str, NaiveDateTime, Vec<f64>)> {
        (0..hours)
            .map(|h| {
                (
                    species.code(),
                    window_start() + Duration::hours(h as i64),
                    (0..n_stations).map(|s| value(h, s)).collect(),
                )
            })
            .collect()
    }

    fn date_columns(t: &NaiveDateTime) -> String {
        t.format("%Y %m %d %H %M").to_string()
    }

    /// Observation table: tab-separated indicators, `PARAMETER YYYY MM DD hh mm`.
    pub fn obs_atab(
        stations: &[TestStation],
        rows: &[(&'static str, NaiveDateTime, Vec<f64>)],
    ) -> String {
        let mut out = String::new();
        writeln!(out, "Type: observation").unwrap();
        writeln!(out, "Source: pollen monitoring network").unwrap();
        let lats: Vec<String> = stations.iter().map(|s| s.lat.to_string()).collect();
        let lons: Vec<String> = stations.iter().map(|s| s.lon.to_string()).collect();
        let names: Vec<&str> = stations.iter().map(|s| s.indicator).collect();
        writeln!(out, "Latitude: {}", lats.join(" ")).unwrap();
        writeln!(out, "Longitude: {}", lons.join(" ")).unwrap();
        writeln!(out, "Missing_value_code: {}", MISSING).unwrap();
        writeln!(out, "Indicator: {}", names.join("\t")).unwrap();
        writeln!(out, "PARAMETER YYYY MM DD hh mm {}", names.join(" ")).unwrap();
        for (code, time, values) in rows {
            let cells: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            writeln!(out, "{} {} {}", code, date_columns(time), cells.join(" ")).unwrap();
        }
        out
    }

    /// Model table: three descriptor columns, fixed-width indicator line.
    pub fn model_atab(
        indicators: &[&str],
        rows: &[(&'static str, NaiveDateTime, Vec<f64>)],
    ) -> String {
        let mut out = String::new();
        writeln!(out, "Type: model").unwrap();
        writeln!(out, "Missing_value_code: {}", MISSING).unwrap();
        writeln!(out, "{:<29}{}", "Indicator", indicators.join("         ")).unwrap();
        writeln!(out, "PARAMETER LEVEL MODEL YYYY MM DD hh mm {}", indicators.join(" ")).unwrap();
        for (code, time, values) in rows {
            let cells: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            writeln!(out, "{} 0 ICON {} {}", code, date_columns(time), cells.join(" ")).unwrap();
        }
        out
    }

    pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    pub fn message(name: &str, data_date: u32, hour: u32, values: Vec<f64>) -> FieldMessage {
        FieldMessage {
            short_name: name.to_string(),
            data_date,
            hour,
            values,
        }
    }

    pub fn write_snapshot(dir: &Path, name: &str, messages: Vec<FieldMessage>) -> PathBuf {
        let json = serde_json::to_string(&FieldSet { messages }).unwrap();
        write_file(dir, name, &json)
    }

    pub fn read_snapshot(path: &Path) -> FieldSet {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    /// Station data built in memory, bypassing the table reader.
    pub fn obs_mod_data(
        species: Species,
        coords: &[Coord],
        data_obs: Array2<f64>,
        model: Option<ModelSeries>,
    ) -> ObsModData {
        let stations = coords
            .iter()
            .enumerate()
            .map(|(i, c)| Station {
                indicator: format!("STN{}", i),
                coord: *c,
            })
            .collect();
        let timestamps = (0..data_obs.nrows())
            .map(|h| window_start() + Duration::hours(h as i64))
            .collect();
        ObsModData {
            species,
            stations,
            timestamps,
            data_obs,
            missing_value: MISSING,
            model,
        }
    }
}
