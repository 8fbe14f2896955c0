use std::collections::HashMap;
use std::fs;

use camino::Utf8Path;

use crate::error::PathwayError;

const BUNDLED_GO_TERMS: &str = include_str!("../data/go_term_names.json");

/// Resolves annotation ids to human-readable names over the network.
pub trait DescriptionLookup: Send + Sync {
    /// Returns names for whichever of `ids` the source knows; unknown ids are
    /// simply absent from the map.
    fn lookup(&self, ids: &[String]) -> Result<HashMap<String, String>, PathwayError>;
}

/// Offline id to name table.
#[derive(Debug, Clone, Default)]
pub struct TermNames {
    names: HashMap<String, String>,
}

impl TermNames {
    pub fn empty() -> Self {
        Self::default()
    }

    /// GO term names shipped inside the binary.
    pub fn bundled() -> Result<Self, PathwayError> {
        Self::from_json("bundled GO term names", BUNDLED_GO_TERMS)
    }

    pub fn from_path(path: &Utf8Path) -> Result<Self, PathwayError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| PathwayError::Filesystem(format!("read {path}: {err}")))?;
        Self::from_json(path.as_str(), &content)
    }

    fn from_json(source_name: &str, content: &str) -> Result<Self, PathwayError> {
        let names: HashMap<String, String> = serde_json::from_str(content)
            .map_err(|err| PathwayError::parse(source_name, err.to_string()))?;
        Ok(Self { names })
    }

    /// Adds entries from `other` for ids this table does not already name.
    pub fn merge_missing(&mut self, other: TermNames) {
        for (id, name) in other.names {
            self.names.entry(id).or_insert(name);
        }
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.names
            .get(id)
            .map(String::as_str)
            .filter(|name| !name.trim().is_empty())
    }

    pub fn insert(&mut self, id: impl Into<String>, name: impl Into<String>) {
        self.names.insert(id.into(), name.into());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_table_parses() {
        let names = TermNames::bundled().unwrap();
        assert_eq!(names.get("GO:0006281"), Some("DNA repair"));
        assert_eq!(names.get("GO:0005634"), Some("nucleus"));
    }

    #[test]
    fn merge_keeps_existing_names() {
        let mut names = TermNames::empty();
        names.insert("GO:0006281", "DNA repair");
        let mut extra = TermNames::empty();
        extra.insert("GO:0006281", "repair of DNA");
        extra.insert("GO:9999999", "made up");
        names.merge_missing(extra);
        assert_eq!(names.get("GO:0006281"), Some("DNA repair"));
        assert_eq!(names.get("GO:9999999"), Some("made up"));
    }
}
