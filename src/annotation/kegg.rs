use rusqlite::{Row, ToSql};
use serde::{Deserialize, Serialize};

use super::{AnnotationDb, AnnotationRecord, FilterField};
use crate::domain::DatasetKind;

pub type KeggDb = AnnotationDb<KeggAnnotation>;

/// A gene's membership in one KEGG pathway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeggAnnotation {
    pub gene_id: String,
    pub gene_symbol: String,
    pub pathway_id: String,
    pub pathway_name: Option<String>,
    pub organism: String,
}

impl AnnotationRecord for KeggAnnotation {
    const KIND: DatasetKind = DatasetKind::Kegg;
    const TABLE: &'static str = "kegg_annotations";
    const TABLE_SQL: &'static str = r#"
        CREATE TABLE IF NOT EXISTS kegg_annotations (
            gene_id TEXT NOT NULL CHECK (length(gene_id) > 0),
            gene_symbol TEXT,
            pathway_id TEXT NOT NULL CHECK (length(pathway_id) > 0),
            pathway_name TEXT,
            organism TEXT,
            PRIMARY KEY (gene_id, pathway_id)
        );
    "#;
    const INDEX_SQL: &'static str = r#"
        CREATE INDEX IF NOT EXISTS idx_kegg_gene_symbol ON kegg_annotations(gene_symbol);
        CREATE INDEX IF NOT EXISTS idx_kegg_pathway_id ON kegg_annotations(pathway_id);
        CREATE INDEX IF NOT EXISTS idx_kegg_pathway_name
            ON kegg_annotations(pathway_name COLLATE NOCASE);
        CREATE INDEX IF NOT EXISTS idx_kegg_organism ON kegg_annotations(organism);
    "#;
    const COLUMNS: &'static [&'static str] = &[
        "gene_id",
        "gene_symbol",
        "pathway_id",
        "pathway_name",
        "organism",
    ];
    const KEY: (&'static str, &'static str) = ("gene_id", "pathway_id");
    const GENE_SYMBOL_COLUMN: &'static str = "gene_symbol";
    const NAME_COLUMN: &'static str = "pathway_name";
    const GROUP_COLUMN: &'static str = "organism";
    const FILTERS: &'static [FilterField] = &[
        FilterField::any_of("gene_ids", "gene_id"),
        FilterField::any_of("gene_symbols", "gene_symbol"),
        FilterField::any_of("pathway_ids", "pathway_id"),
        FilterField::any_of("organism", "organism"),
        FilterField::contains("pathway_name", "pathway_name"),
    ];
    const EXPORT_HEADERS: &'static [&'static str] = &["GeneID", "PATH", "Annot"];

    fn bind(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.gene_id,
            &self.gene_symbol,
            &self.pathway_id,
            &self.pathway_name,
            &self.organism,
        ]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            gene_id: row.get(0)?,
            gene_symbol: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            pathway_id: row.get(2)?,
            pathway_name: row.get(3)?,
            organism: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        })
    }

    fn export_row(&self) -> Vec<String> {
        vec![
            self.gene_symbol.clone(),
            self.pathway_id.clone(),
            self.pathway_name.clone().unwrap_or_default(),
        ]
    }
}
