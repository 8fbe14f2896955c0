use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PathwayError;

/// Common name, NCBI taxonomy id and KEGG organism code.
pub const SPECIES: &[(&str, &str, &str)] = &[
    ("human", "9606", "hsa"),
    ("mouse", "10090", "mmu"),
    ("rat", "10116", "rno"),
    ("zebrafish", "7955", "dre"),
    ("fly", "7227", "dme"),
    ("worm", "6239", "cel"),
    ("yeast", "4932", "sce"),
];

pub fn kegg_organism_for(species: &str) -> Option<&'static str> {
    SPECIES
        .iter()
        .find(|(name, _, _)| *name == species)
        .map(|(_, _, code)| *code)
}

pub fn species_for_kegg_organism(organism: &str) -> Option<&'static str> {
    SPECIES
        .iter()
        .find(|(_, _, code)| *code == organism)
        .map(|(name, _, _)| *name)
}

pub fn taxid_for(species: &str) -> Option<&'static str> {
    SPECIES
        .iter()
        .find(|(name, _, _)| *name == species)
        .map(|(_, taxid, _)| *taxid)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Kegg,
    Go,
    Msigdb,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Kegg => "kegg",
            DatasetKind::Go => "go",
            DatasetKind::Msigdb => "msigdb",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifies one logical annotation dataset, and therefore one store file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DatasetKey {
    Kegg { organism: String },
    Go { species: String },
    Msigdb { species: String, collection: String },
}

impl DatasetKey {
    pub fn kegg(organism: &str) -> Result<Self, PathwayError> {
        format!("kegg:{organism}").parse()
    }

    pub fn go(species: &str) -> Result<Self, PathwayError> {
        format!("go:{species}").parse()
    }

    pub fn msigdb(species: &str, collection: &str) -> Result<Self, PathwayError> {
        format!("msigdb:{species}:{collection}").parse()
    }

    pub fn kind(&self) -> DatasetKind {
        match self {
            DatasetKey::Kegg { .. } => DatasetKind::Kegg,
            DatasetKey::Go { .. } => DatasetKind::Go,
            DatasetKey::Msigdb { .. } => DatasetKind::Msigdb,
        }
    }

    /// File stem shared by the store file and its manifest.
    pub fn file_stem(&self) -> String {
        match self {
            DatasetKey::Kegg { organism } => format!("kegg_{organism}"),
            DatasetKey::Go { species } => format!("go_{species}"),
            DatasetKey::Msigdb {
                species,
                collection,
            } => format!("msigdb_{species}_{}", collection.to_lowercase()),
        }
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetKey::Kegg { organism } => write!(f, "kegg:{organism}"),
            DatasetKey::Go { species } => write!(f, "go:{species}"),
            DatasetKey::Msigdb {
                species,
                collection,
            } => write!(f, "msigdb:{species}:{collection}"),
        }
    }
}

impl FromStr for DatasetKey {
    type Err = PathwayError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let invalid = || PathwayError::InvalidDatasetKey(value.to_string());
        let (kind, rest) = trimmed.split_once(':').ok_or_else(invalid)?;
        match kind.to_ascii_lowercase().as_str() {
            "kegg" => {
                let rest = rest.trim().to_ascii_lowercase();
                let organism = kegg_organism_for(&rest)
                    .map(str::to_string)
                    .unwrap_or(rest);
                if !kegg_organism_re().is_match(&organism) {
                    return Err(invalid());
                }
                Ok(DatasetKey::Kegg { organism })
            }
            "go" => {
                let species = rest.trim().to_ascii_lowercase();
                if !species_re().is_match(&species) {
                    return Err(invalid());
                }
                Ok(DatasetKey::Go { species })
            }
            "msigdb" => {
                let (species, collection) = match rest.split_once(':') {
                    Some((species, collection)) => {
                        (species.trim().to_ascii_lowercase(), collection)
                    }
                    None => ("human".to_string(), rest),
                };
                if species != "human" && species != "mouse" {
                    return Err(invalid());
                }
                let collection = collection.trim().to_ascii_uppercase();
                if !collection_re().is_match(&collection) {
                    return Err(invalid());
                }
                Ok(DatasetKey::Msigdb {
                    species,
                    collection,
                })
            }
            _ => Err(invalid()),
        }
    }
}

fn kegg_organism_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z]{3,4}$").expect("valid regex"))
}

fn species_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z_]*$").expect("valid regex"))
}

fn collection_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(H|C[1-8])$").expect("valid regex"))
}

/// Which gene column `query_by_gene` matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GeneIdType {
    #[default]
    Symbol,
    Id,
}

/// GO namespace, stored as its single-letter GAF aspect code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoAspect {
    BiologicalProcess,
    MolecularFunction,
    CellularComponent,
}

impl GoAspect {
    pub fn code(&self) -> &'static str {
        match self {
            GoAspect::BiologicalProcess => "P",
            GoAspect::MolecularFunction => "F",
            GoAspect::CellularComponent => "C",
        }
    }

    pub fn namespace(&self) -> &'static str {
        match self {
            GoAspect::BiologicalProcess => "biological_process",
            GoAspect::MolecularFunction => "molecular_function",
            GoAspect::CellularComponent => "cellular_component",
        }
    }
}

impl FromStr for GoAspect {
    type Err = PathwayError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "p" | "biological_process" => Ok(GoAspect::BiologicalProcess),
            "f" | "molecular_function" => Ok(GoAspect::MolecularFunction),
            "c" | "cellular_component" => Ok(GoAspect::CellularComponent),
            _ => Err(PathwayError::Validation(format!(
                "unknown GO aspect or namespace: {}",
                value.trim()
            ))),
        }
    }
}
