use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::PdbbindError;

/// Named partition of a PDBbind release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Subset {
    Casf,
    Refined,
}

impl Subset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subset::Casf => "casf",
            Subset::Refined => "refined",
        }
    }
}

impl fmt::Display for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of per-structure artifact a record query locates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Activities,
    Ligands,
    Proteins,
    Pockets,
}

impl RecordType {
    /// File name suffix and extension for file-backed record types.
    pub fn naming(&self) -> Option<(&'static str, &'static str)> {
        match self {
            RecordType::Activities => None,
            RecordType::Ligands => Some(("_ligand", ".mol2")),
            RecordType::Proteins => Some(("_protein", ".pdb")),
            RecordType::Pockets => Some(("_pocket", ".pdb")),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::Activities => write!(f, "activities"),
            RecordType::Ligands => write!(f, "ligands"),
            RecordType::Proteins => write!(f, "proteins"),
            RecordType::Pockets => write!(f, "pockets"),
        }
    }
}

impl FromStr for RecordType {
    type Err = PdbbindError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "activities" => Ok(RecordType::Activities),
            "ligands" => Ok(RecordType::Ligands),
            "proteins" => Ok(RecordType::Proteins),
            "pockets" => Ok(RecordType::Pockets),
            _ => Err(PdbbindError::InvalidRecordType(value.to_string())),
        }
    }
}

/// A (release, subset) request such as `2016:refined`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetRef {
    pub release: u16,
    pub subset: Subset,
}

impl DatasetRef {
    pub fn new(release: u16, subset: Subset) -> Self {
        Self { release, subset }
    }

    pub fn parse_subset(release: u16, value: &str) -> Result<Self, PdbbindError> {
        let subset = match value.trim().to_lowercase().as_str() {
            "casf" => Subset::Casf,
            "refined" => Subset::Refined,
            _ => {
                return Err(PdbbindError::UnknownSubset {
                    release,
                    subset: value.to_string(),
                });
            }
        };
        Ok(Self { release, subset })
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.release, self.subset)
    }
}

impl FromStr for DatasetRef {
    type Err = PdbbindError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (release, subset) = trimmed
            .split_once(':')
            .ok_or_else(|| PdbbindError::InvalidDatasetRef(value.to_string()))?;
        let release = release
            .trim()
            .parse::<u16>()
            .map_err(|_| PdbbindError::InvalidDatasetRef(value.to_string()))?;
        Self::parse_subset(release, subset)
    }
}

/// One remote archive of a dataset and the file name it is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveSpec {
    pub url: String,
    pub file_name: String,
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
