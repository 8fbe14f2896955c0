use std::collections::BTreeMap;

use rusqlite::types::Value;
use rusqlite::{Row, ToSql, params_from_iter};
use serde::{Deserialize, Serialize};

use super::filter::uppercased;
use super::{AnnotationDb, AnnotationRecord, FilterField, db_err};
use crate::domain::DatasetKind;
use crate::error::PathwayError;

pub type MsigdbDb = AnnotationDb<MsigdbAnnotation>;

/// Membership of one gene symbol in one MSigDB gene set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsigdbAnnotation {
    pub gene_symbol: String,
    pub gene_set_name: String,
    pub collection: String,
    pub description: Option<String>,
    pub organism: String,
}

impl AnnotationRecord for MsigdbAnnotation {
    const KIND: DatasetKind = DatasetKind::Msigdb;
    const TABLE: &'static str = "msigdb_annotations";
    const TABLE_SQL: &'static str = r#"
        CREATE TABLE IF NOT EXISTS msigdb_annotations (
            gene_symbol TEXT NOT NULL CHECK (length(gene_symbol) > 0),
            gene_set_name TEXT NOT NULL CHECK (length(gene_set_name) > 0),
            collection TEXT,
            description TEXT,
            organism TEXT,
            PRIMARY KEY (gene_symbol, gene_set_name)
        );
    "#;
    const INDEX_SQL: &'static str = r#"
        CREATE INDEX IF NOT EXISTS idx_msigdb_gene_set ON msigdb_annotations(gene_set_name);
        CREATE INDEX IF NOT EXISTS idx_msigdb_collection ON msigdb_annotations(collection);
        CREATE INDEX IF NOT EXISTS idx_msigdb_description
            ON msigdb_annotations(description COLLATE NOCASE);
    "#;
    const COLUMNS: &'static [&'static str] = &[
        "gene_symbol",
        "gene_set_name",
        "collection",
        "description",
        "organism",
    ];
    const KEY: (&'static str, &'static str) = ("gene_symbol", "gene_set_name");
    const GENE_SYMBOL_COLUMN: &'static str = "gene_symbol";
    const NAME_COLUMN: &'static str = "description";
    const GROUP_COLUMN: &'static str = "collection";
    const FILTERS: &'static [FilterField] = &[
        FilterField::any_of("gene_symbols", "gene_symbol"),
        FilterField::any_of("gene_set_names", "gene_set_name"),
        FilterField::any_of("collection", "collection").normalized(uppercased),
        FilterField::any_of("organism", "organism"),
        FilterField::contains("gene_set_name", "gene_set_name"),
        FilterField::contains("description", "description"),
    ];
    const EXPORT_HEADERS: &'static [&'static str] =
        &["GeneID", "GeneSet", "Collection", "Description"];

    fn bind(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.gene_symbol,
            &self.gene_set_name,
            &self.collection,
            &self.description,
            &self.organism,
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            gene_symbol: row.get(0)?,
            gene_set_name: row.get(1)?,
            collection: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            description: row.get(3)?,
            organism: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        })
    }

    fn export_row(&self) -> Vec<String> {
        vec![
            self.gene_symbol.clone(),
            self.gene_set_name.clone(),
            self.collection.clone(),
            self.description.clone().unwrap_or_default(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneSetOverlap {
    pub gene_set_name: String,
    pub collection: String,
    pub description: Option<String>,
    pub set_size: usize,
    pub overlap: usize,
    pub overlapping_genes: Vec<String>,
}

impl AnnotationDb<MsigdbAnnotation> {
    /// Gene sets sharing at least `min_overlap` symbols with `genes`,
    /// largest overlap first, then by name.
    pub fn gene_set_overlaps<S: AsRef<str>>(
        &self,
        genes: &[S],
        collection: Option<&str>,
        min_overlap: usize,
    ) -> Result<Vec<GeneSetOverlap>, PathwayError> {
        if genes.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; genes.len()].join(", ");
        let mut sql = format!(
            "SELECT m.gene_set_name, m.collection, m.description, m.gene_symbol, \
             (SELECT COUNT(*) FROM msigdb_annotations s WHERE s.gene_set_name = m.gene_set_name) \
             FROM msigdb_annotations m WHERE m.gene_symbol IN ({placeholders})"
        );
        let mut params = genes
            .iter()
            .map(|gene| Value::Text(gene.as_ref().trim().to_string()))
            .collect::<Vec<_>>();
        if let Some(collection) = collection {
            sql.push_str(" AND m.collection = ?");
            params.push(Value::Text(collection.trim().to_ascii_uppercase()));
        }
        sql.push_str(" ORDER BY m.gene_set_name, m.gene_symbol");

        let mut stmt = self.conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(params), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .map_err(db_err)?;

        let mut by_set: BTreeMap<String, GeneSetOverlap> = BTreeMap::new();
        for row in rows {
            let (name, collection, description, symbol, set_size) = row.map_err(db_err)?;
            let entry = by_set
                .entry(name.clone())
                .or_insert_with(|| GeneSetOverlap {
                    gene_set_name: name,
                    collection: collection.unwrap_or_default(),
                    description,
                    set_size: set_size as usize,
                    overlap: 0,
                    overlapping_genes: Vec::new(),
                });
            entry.overlap += 1;
            entry.overlapping_genes.push(symbol);
        }

        let mut overlaps = by_set
            .into_values()
            .filter(|overlap| overlap.overlap >= min_overlap.max(1))
            .collect::<Vec<_>>();
        overlaps.sort_by(|a, b| {
            b.overlap
                .cmp(&a.overlap)
                .then_with(|| a.gene_set_name.cmp(&b.gene_set_name))
        });
        Ok(overlaps)
    }

    /// Distinct collections present in the store.
    pub fn collections(&self) -> Result<Vec<String>, PathwayError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT DISTINCT collection FROM msigdb_annotations \
                 WHERE collection IS NOT NULL ORDER BY collection",
            )
            .map_err(db_err)?;
        let collections = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(collections)
    }
}
