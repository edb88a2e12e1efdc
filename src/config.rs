use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::SpeciesParamsOverride;
use crate::errors::ConfigError;
use crate::species::{Operation, Species};

/// Run configuration, one JSON object per invocation.
///
/// File keys are optional at parse time; [`Config::paths_for`] checks the ones
/// the requested operation needs.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// Observed hourly concentrations (ATAB).
    #[serde(default)]
    pub station_obs_file: Option<PathBuf>,
    /// Modelled hourly concentrations at the stations (ATAB).
    #[serde(default)]
    pub station_mod_file: Option<PathBuf>,
    /// Pollen snapshot read as input.
    #[serde(default)]
    pub pov_infile: Option<PathBuf>,
    /// Where the updated snapshot is written.
    #[serde(default)]
    pub pov_outfile: Option<PathBuf>,
    /// Grid constants (CLON/CLAT).
    #[serde(default)]
    pub const_file: Option<PathBuf>,
    /// Snapshot holding T_2M.
    #[serde(default)]
    pub t2m_file: Option<PathBuf>,
    /// Number of stations with unrepairable gaps that are still tolerated.
    #[serde(default)]
    pub max_miss_stns: usize,
    /// Hours the output validity time is advanced by.
    #[serde(default = "default_hour_incr")]
    pub hour_incr: i64,
    #[serde(default)]
    pub species_constants: HashMap<Species, SpeciesParamsOverride>,
}

fn default_hour_incr() -> i64 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            station_obs_file: None,
            station_mod_file: None,
            pov_infile: None,
            pov_outfile: None,
            const_file: None,
            t2m_file: None,
            max_miss_stns: 0,
            hour_incr: default_hour_incr(),
            species_constants: HashMap::new(),
        }
    }
}

/// Files resolved for one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationPaths {
    pub station_obs_file: PathBuf,
    pub station_mod_file: Option<PathBuf>,
    pub pov_infile: PathBuf,
    pub pov_outfile: PathBuf,
    pub const_file: PathBuf,
    pub t2m_file: Option<PathBuf>,
}

impl Config {
    /// Checks that every file the operation needs is configured.
    pub fn paths_for(&self, operation: Operation) -> Result<OperationPaths, ConfigError> {
        let op = operation.name();
        let require = |value: &Option<PathBuf>, key: &'static str| {
            value
                .clone()
                .ok_or(ConfigError::MissingKey { key, operation: op })
        };

        let station_mod_file = match operation {
            Operation::Strength => Some(require(&self.station_mod_file, "station_mod_file")?),
            Operation::Phenology => None,
        };
        let t2m_file = match operation {
            Operation::Phenology => Some(require(&self.t2m_file, "t2m_file")?),
            Operation::Strength => None,
        };

        Ok(OperationPaths {
            station_obs_file: require(&self.station_obs_file, "station_obs_file")?,
            station_mod_file,
            pov_infile: require(&self.pov_infile, "pov_infile")?,
            pov_outfile: require(&self.pov_outfile, "pov_outfile")?,
            const_file: require(&self.const_file, "const_file")?,
            t2m_file,
        })
    }
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    debug!("Loading configuration from {}", path.display());
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let file = File::open(path).map_err(|e| ConfigError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let reader = BufReader::new(file);

    let config: Config =
        serde_json::from_reader(reader).map_err(|e| ConfigError::JsonParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_applied() {
        let file = write_config(r#"{"station_obs_file": "obs.atab"}"#);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.max_miss_stns, 0);
        assert_eq!(config.hour_incr, 1);
        assert!(config.species_constants.is_empty());
        assert_eq!(config.station_obs_file, Some(PathBuf::from("obs.atab")));
    }

    #[test]
    fn test_species_overrides_parsed() {
        let file = write_config(
            r#"{"hour_incr": 3, "species_constants": {"BETU": {"thr_con_24": 720.0}}}"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.hour_incr, 3);
        let betu = config.species_constants[&Species::Betu];
        assert_eq!(betu.thr_con_24, Some(720.0));
        assert_eq!(betu.thr_con_120, None);
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/pollen/config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{not json");
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::JsonParseError { .. }));
    }

    #[test]
    fn test_paths_for_operation() {
        let config = Config {
            station_obs_file: Some("obs".into()),
            pov_infile: Some("in".into()),
            pov_outfile: Some("out".into()),
            const_file: Some("const".into()),
            t2m_file: Some("t2m".into()),
            ..Default::default()
        };

        let paths = config.paths_for(Operation::Phenology).unwrap();
        assert_eq!(paths.t2m_file, Some(PathBuf::from("t2m")));
        assert_eq!(paths.station_mod_file, None);

        let err = config.paths_for(Operation::Strength).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingKey {
                key: "station_mod_file",
                ..
            }
        ));
    }
}
