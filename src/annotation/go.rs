use rusqlite::types::Value;
use rusqlite::{Row, ToSql, params_from_iter};
use serde::{Deserialize, Serialize};

use super::filter::uppercased;
use super::{AnnotationDb, AnnotationRecord, FilterField, db_err};
use crate::domain::{DatasetKind, GoAspect};
use crate::error::PathwayError;

pub type GoDb = AnnotationDb<GoAnnotation>;

/// One GAF association between a gene product and a GO term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoAnnotation {
    pub gene_id: String,
    pub gene_symbol: String,
    pub go_id: String,
    pub term_name: Option<String>,
    pub evidence_code: String,
    /// Single-letter aspect code: P, F or C.
    pub aspect: String,
}

fn aspect_code(value: &str) -> Result<String, PathwayError> {
    Ok(value.parse::<GoAspect>()?.code().to_string())
}

impl AnnotationRecord for GoAnnotation {
    const KIND: DatasetKind = DatasetKind::Go;
    const TABLE: &'static str = "go_annotations";
    // term_name arrived in schema 2 and is added to older files on open.
    const TABLE_SQL: &'static str = r#"
        CREATE TABLE IF NOT EXISTS go_annotations (
            gene_id TEXT NOT NULL CHECK (length(gene_id) > 0),
            gene_symbol TEXT,
            go_id TEXT NOT NULL CHECK (length(go_id) > 0),
            evidence_code TEXT,
            aspect TEXT,
            PRIMARY KEY (gene_id, go_id)
        );
    "#;
    const INDEX_SQL: &'static str = r#"
        CREATE INDEX IF NOT EXISTS idx_go_gene_symbol ON go_annotations(gene_symbol);
        CREATE INDEX IF NOT EXISTS idx_go_go_id ON go_annotations(go_id);
        CREATE INDEX IF NOT EXISTS idx_go_evidence ON go_annotations(evidence_code);
        CREATE INDEX IF NOT EXISTS idx_go_aspect ON go_annotations(aspect);
        CREATE INDEX IF NOT EXISTS idx_go_term_name ON go_annotations(term_name COLLATE NOCASE);
    "#;
    const COLUMNS: &'static [&'static str] = &[
        "gene_id",
        "gene_symbol",
        "go_id",
        "term_name",
        "evidence_code",
        "aspect",
    ];
    const KEY: (&'static str, &'static str) = ("gene_id", "go_id");
    const GENE_SYMBOL_COLUMN: &'static str = "gene_symbol";
    const NAME_COLUMN: &'static str = "term_name";
    const GROUP_COLUMN: &'static str = "aspect";
    const OPTIONAL_COLUMNS: &'static [(&'static str, &'static str)] = &[("term_name", "TEXT")];
    const FILTERS: &'static [FilterField] = &[
        FilterField::any_of("gene_ids", "gene_id"),
        FilterField::any_of("gene_symbols", "gene_symbol"),
        FilterField::any_of("go_ids", "go_id"),
        FilterField::any_of("evidence_codes", "evidence_code").normalized(uppercased),
        FilterField::any_of("aspect", "aspect").normalized(aspect_code),
        FilterField::any_of("namespace", "aspect").normalized(aspect_code),
        FilterField::contains("term_name", "term_name"),
    ];
    const EXPORT_HEADERS: &'static [&'static str] = &["GeneID", "TERM", "Aspect", "Evidence"];

    fn bind(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.gene_id,
            &self.gene_symbol,
            &self.go_id,
            &self.term_name,
            &self.evidence_code,
            &self.aspect,
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            gene_id: row.get(0)?,
            gene_symbol: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            go_id: row.get(2)?,
            term_name: row.get(3)?,
            evidence_code: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            aspect: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        })
    }

    fn export_row(&self) -> Vec<String> {
        vec![
            self.gene_symbol.clone(),
            self.go_id.clone(),
            self.aspect.clone(),
            self.evidence_code.clone(),
        ]
    }
}

impl GoAnnotation {
    pub fn go_aspect(&self) -> Option<GoAspect> {
        self.aspect.parse().ok()
    }
}

impl AnnotationDb<GoAnnotation> {
    /// Deletes every row whose evidence code is not in `codes`, in one
    /// transaction, and returns how many went. An empty list keeps everything,
    /// matching ingest.
    pub fn retain_evidence_codes<S: AsRef<str>>(&mut self, codes: &[S]) -> Result<usize, PathwayError> {
        let codes = codes
            .iter()
            .map(|code| code.as_ref().trim().to_ascii_uppercase())
            .filter(|code| !code.is_empty())
            .collect::<Vec<_>>();
        if codes.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; codes.len()].join(", ");
        let sql = format!(
            "DELETE FROM go_annotations \
             WHERE evidence_code IS NULL OR upper(evidence_code) NOT IN ({placeholders})"
        );
        let tx = self.conn.transaction().map_err(db_err)?;
        let removed = tx
            .execute(&sql, params_from_iter(codes.into_iter().map(Value::Text)))
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        tracing::info!(path = %self.path, removed, "dropped annotations outside evidence allow-list");
        Ok(removed)
    }
}
