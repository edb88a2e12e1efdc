//! Pollen species and the structured identifiers of their calibration fields.
//!
//! Field names in the snapshot are built as `<species code><field suffix>`
//! (e.g. `ALNUtthrs`). Inside the crate fields are addressed by [`FieldId`];
//! the string form only appears at the field-store boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Short name of the 2m temperature field (Kelvin).
pub const T_2M: &str = "T_2M";
/// Short name of the grid longitude field in the constants file.
pub const CLON: &str = "CLON";
/// Short name of the grid latitude field in the constants file.
pub const CLAT: &str = "CLAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Species {
    /// Alder
    #[serde(rename = "ALNU")]
    Alnu,
    /// Birch
    #[serde(rename = "BETU")]
    Betu,
    /// Grass
    #[serde(rename = "POAC")]
    Poac,
    /// Hazel
    #[serde(rename = "CORY")]
    Cory,
}

impl Species {
    pub const ALL: [Species; 4] = [Species::Alnu, Species::Betu, Species::Poac, Species::Cory];

    /// Four-letter code used in station tables and field names.
    pub fn code(self) -> &'static str {
        match self {
            Species::Alnu => "ALNU",
            Species::Betu => "BETU",
            Species::Poac => "POAC",
            Species::Cory => "CORY",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Species::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Position in [`Species::ALL`], used to index per-species tables.
    pub fn index(self) -> usize {
        match self {
            Species::Alnu => 0,
            Species::Betu => 1,
            Species::Poac => 2,
            Species::Cory => 3,
        }
    }

    /// Grass tracks a season length instead of a season-end threshold.
    pub fn phenology_field_set(self) -> PhenologyFieldSet {
        match self {
            Species::Poac => PhenologyFieldSet::SeasonLength(FieldId::new(self, FieldKind::Saisl)),
            _ => PhenologyFieldSet::EndThreshold(FieldId::new(self, FieldKind::Tthre)),
        }
    }

    pub fn field(self, kind: FieldKind) -> FieldId {
        FieldId::new(self, kind)
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Species {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Species::from_code(s).ok_or_else(|| format!("unknown pollen species '{}'", s))
    }
}

/// The per-species quantities stored in the pollen snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKind {
    /// Temperature-sum threshold for the start of the season.
    Tthrs,
    /// Temperature-sum threshold for the end of the season (not POAC).
    Tthre,
    /// Season length in days (POAC only).
    Saisl,
    /// Days since the season started, 0 before the start.
    Saisn,
    /// Accumulated temperature sum since Dec 1.
    Ctsum,
    /// Emission strength tuning factor.
    Tune,
}

impl FieldKind {
    pub const ALL: [FieldKind; 6] = [
        FieldKind::Tthrs,
        FieldKind::Tthre,
        FieldKind::Saisl,
        FieldKind::Saisn,
        FieldKind::Ctsum,
        FieldKind::Tune,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            FieldKind::Tthrs => "tthrs",
            FieldKind::Tthre => "tthre",
            FieldKind::Saisl => "saisl",
            FieldKind::Saisn => "saisn",
            FieldKind::Ctsum => "ctsum",
            FieldKind::Tune => "tune",
        }
    }
}

/// A species-specific snapshot field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId {
    pub species: Species,
    pub kind: FieldKind,
}

impl FieldId {
    pub fn new(species: Species, kind: FieldKind) -> Self {
        Self { species, kind }
    }

    /// Name of the field in the snapshot.
    pub fn storage_key(&self) -> String {
        format!("{}{}", self.species.code(), self.kind.suffix())
    }

    /// Inverse of [`FieldId::storage_key`]. Returns `None` for non-pollen fields
    /// and for combinations a species does not carry (`POACtthre`, `ALNUsaisl`).
    pub fn parse(key: &str) -> Option<Self> {
        let code = key.get(..4)?;
        let suffix = key.get(4..)?;
        let species = Species::from_code(code)?;
        let kind = FieldKind::ALL.into_iter().find(|k| k.suffix() == suffix)?;
        let id = FieldId::new(species, kind);
        match (species, kind) {
            (Species::Poac, FieldKind::Tthre) => None,
            (Species::Poac, _) => Some(id),
            (_, FieldKind::Saisl) => None,
            _ => Some(id),
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.species.code(), self.kind.suffix())
    }
}

/// The field a species uses to describe the end of its season.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhenologyFieldSet {
    EndThreshold(FieldId),
    SeasonLength(FieldId),
}

impl PhenologyFieldSet {
    pub fn end_threshold(&self) -> Option<FieldId> {
        match self {
            PhenologyFieldSet::EndThreshold(id) => Some(*id),
            PhenologyFieldSet::SeasonLength(_) => None,
        }
    }

    pub fn season_length(&self) -> Option<FieldId> {
        match self {
            PhenologyFieldSet::SeasonLength(id) => Some(*id),
            PhenologyFieldSet::EndThreshold(_) => None,
        }
    }

    pub fn field(&self) -> FieldId {
        match self {
            PhenologyFieldSet::EndThreshold(id) | PhenologyFieldSet::SeasonLength(id) => *id,
        }
    }
}

/// The two calibration operations and the snapshot fields each one needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Phenology,
    Strength,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::Phenology => "update_phenology",
            Operation::Strength => "update_strength",
        }
    }

    /// Mandatory pollen fields for one species.
    pub fn required_fields(self, species: Species) -> Vec<FieldId> {
        match self {
            Operation::Phenology => vec![
                species.field(FieldKind::Tthrs),
                species.phenology_field_set().field(),
                species.field(FieldKind::Saisn),
                species.field(FieldKind::Ctsum),
            ],
            Operation::Strength => vec![
                species.field(FieldKind::Tune),
                species.field(FieldKind::Saisn),
            ],
        }
    }

    /// Whether a snapshot field is read by this operation.
    pub fn uses(self, id: FieldId) -> bool {
        self.required_fields(id.species).contains(&id)
    }
}
