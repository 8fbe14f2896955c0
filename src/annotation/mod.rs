//! Embedded SQLite stores of gene annotation records.
//!
//! One file holds one dataset (a KEGG organism, a GO species, an MSigDB
//! collection). The schema is the persisted format: newer versions may add
//! optional columns, which are created on open, but never remove or rename
//! existing ones.
//!
//! Substring filters on the name columns use `LIKE`, which SQLite evaluates
//! by scanning. The `COLLATE NOCASE` index on each name column serves
//! equality and prefix lookups only; this is not full-text search, and case
//! folding covers ASCII letters only.

mod filter;
pub mod go;
pub mod kegg;
pub mod msigdb;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::marker::PhantomData;

use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::types::Value;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, ToSql, params, params_from_iter};
use serde::{Deserialize, Serialize};

use crate::domain::{DatasetKind, GeneIdType};
use crate::error::PathwayError;
use crate::terms::{DescriptionLookup, TermNames};

pub use filter::{Criteria, FilterField, MatchKind, Predicate};
pub use go::{GoAnnotation, GoDb};
pub use kegg::{KeggAnnotation, KeggDb};
pub use msigdb::{GeneSetOverlap, MsigdbAnnotation, MsigdbDb};

pub const SCHEMA_VERSION: u32 = 2;

/// Names sent to a [`DescriptionLookup`] per call.
pub const LOOKUP_BATCH_SIZE: usize = 100;

/// A row type of one annotation table.
///
/// Column names are compile-time constants; only values are ever bound at
/// runtime.
pub trait AnnotationRecord: Sized + Clone + Serialize {
    const KIND: DatasetKind;
    const TABLE: &'static str;
    /// `CREATE TABLE IF NOT EXISTS` statement for [`Self::TABLE`].
    const TABLE_SQL: &'static str;
    /// Index statements, run after optional columns exist.
    const INDEX_SQL: &'static str;
    /// Every column, in the order [`Self::bind`] and [`Self::from_row`] use.
    const COLUMNS: &'static [&'static str];
    /// (gene column, annotation id column); the primary key.
    const KEY: (&'static str, &'static str);
    const GENE_SYMBOL_COLUMN: &'static str;
    /// Human-readable name filled in by description backfill.
    const NAME_COLUMN: &'static str;
    /// Column summarised per value in [`StoreStats::groups`].
    const GROUP_COLUMN: &'static str;
    /// Columns added after the first schema, with their SQL type.
    const OPTIONAL_COLUMNS: &'static [(&'static str, &'static str)] = &[];
    const FILTERS: &'static [FilterField];
    const EXPORT_HEADERS: &'static [&'static str];

    fn bind(&self) -> Vec<&dyn ToSql>;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    fn export_row(&self) -> Vec<String>;
}

/// Open-time behaviour for a store file.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreOptions {
    /// Delete and recreate a file that is not a readable store instead of
    /// failing with [`PathwayError::StoreCorruption`].
    pub recreate_if_corrupt: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total: u64,
    pub unique_genes: u64,
    pub unique_annotations: u64,
    pub missing_names: u64,
    pub groups: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillReport {
    /// Distinct annotation ids without a name before the run.
    pub missing: usize,
    pub from_bundled: usize,
    pub from_lookup: usize,
    pub lookup_batches: usize,
    pub rows_updated: usize,
    pub unresolved: usize,
}

/// Fixed-column projection of a store for external tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ExportTable {
    pub fn write_tsv<W: Write>(&self, writer: &mut W) -> Result<(), PathwayError> {
        let map_err = |err: std::io::Error| PathwayError::Filesystem(err.to_string());
        writeln!(writer, "{}", self.headers.join("\t")).map_err(map_err)?;
        for row in &self.rows {
            let cells = row
                .iter()
                .map(|cell| cell.replace(['\t', '\n'], " "))
                .collect::<Vec<_>>();
            writeln!(writer, "{}", cells.join("\t")).map_err(map_err)?;
        }
        Ok(())
    }

    /// Rows as header-keyed objects.
    pub fn records(&self) -> Vec<BTreeMap<String, String>> {
        self.rows
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

pub struct AnnotationDb<R: AnnotationRecord> {
    conn: Connection,
    path: Utf8PathBuf,
    _record: PhantomData<R>,
}

impl<R: AnnotationRecord> std::fmt::Debug for AnnotationDb<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationDb")
            .field("kind", &R::KIND)
            .field("path", &self.path)
            .finish()
    }
}

impl<R: AnnotationRecord> AnnotationDb<R> {
    pub fn open(path: &Utf8Path) -> Result<Self, PathwayError> {
        Self::open_with(path, StoreOptions::default())
    }

    pub fn open_with(path: &Utf8Path, options: StoreOptions) -> Result<Self, PathwayError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| PathwayError::Filesystem(err.to_string()))?;
        }
        match Self::open_existing(path) {
            Err(PathwayError::StoreCorruption { message, .. }) if options.recreate_if_corrupt => {
                tracing::warn!(%path, %message, "recreating unreadable annotation store");
                remove_store_file(path)?;
                Self::open_existing(path)
            }
            other => other,
        }
    }

    fn open_existing(path: &Utf8Path) -> Result<Self, PathwayError> {
        let conn = Connection::open(path.as_std_path()).map_err(|err| classify(path, err))?;
        let db = Self {
            conn,
            path: path.to_path_buf(),
            _record: PhantomData,
        };
        db.conn
            .pragma_update_and_check(None, "journal_mode", "DELETE", |row| {
                row.get::<_, String>(0)
            })
            .and_then(|_| {
                db.conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS metadata (key TEXT PRIMARY KEY, value TEXT);",
                )
            })
            .map_err(|err| classify(path, err))?;
        db.check_kind()?;
        db.initialize().map_err(|err| classify(path, err))?;
        tracing::debug!(%path, kind = %R::KIND, "opened annotation store");
        Ok(db)
    }

    fn initialize(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(R::TABLE_SQL)?;
        self.add_missing_columns()?;
        self.conn.execute_batch(R::INDEX_SQL)?;

        let version = SCHEMA_VERSION.to_string();
        if self.metadata_value("schema_version")?.as_deref() != Some(version.as_str()) {
            self.write_metadata("schema_version", &version)?;
        }
        if self.metadata_value("kind")?.is_none() {
            self.write_metadata("kind", R::KIND.as_str())?;
        }
        Ok(())
    }

    fn add_missing_columns(&self) -> rusqlite::Result<()> {
        if R::OPTIONAL_COLUMNS.is_empty() {
            return Ok(());
        }
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", R::TABLE))?;
        let existing = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (column, sql_type) in R::OPTIONAL_COLUMNS {
            if !existing.iter().any(|name| name == column) {
                tracing::info!(path = %self.path, column, "adding column to older store");
                self.conn.execute_batch(&format!(
                    "ALTER TABLE {} ADD COLUMN {column} {sql_type};",
                    R::TABLE
                ))?;
            }
        }
        Ok(())
    }

    fn check_kind(&self) -> Result<(), PathwayError> {
        let kind = self.get_metadata("kind")?;
        match kind.as_deref() {
            Some(kind) if kind != R::KIND.as_str() => Err(PathwayError::StoreCorruption {
                path: self.path.clone().into_std_path_buf(),
                message: format!("store holds {kind} annotations, expected {}", R::KIND),
            }),
            _ => Ok(()),
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Inserts new keys and overwrites descriptive columns of existing ones.
    ///
    /// Runs in one transaction: any failing row leaves the store as it was.
    /// A record without a name keeps the name already stored for its key.
    pub fn bulk_upsert(&mut self, records: &[R]) -> Result<usize, PathwayError> {
        let tx = self.conn.transaction().map_err(db_err)?;
        {
            let mut stmt = tx.prepare(&upsert_sql::<R>()).map_err(db_err)?;
            for record in records {
                stmt.execute(record.bind().as_slice()).map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)?;
        tracing::info!(path = %self.path, rows = records.len(), "upserted annotations");
        Ok(records.len())
    }

    /// Replaces every row with `records` in one transaction.
    pub fn replace_all(&mut self, records: &[R]) -> Result<usize, PathwayError> {
        let tx = self.conn.transaction().map_err(db_err)?;
        tx.execute(&format!("DELETE FROM {}", R::TABLE), [])
            .map_err(db_err)?;
        {
            let mut stmt = tx.prepare(&insert_sql::<R>()).map_err(db_err)?;
            for record in records {
                stmt.execute(record.bind().as_slice()).map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)?;
        tracing::info!(path = %self.path, rows = records.len(), "replaced annotations");
        Ok(records.len())
    }

    /// Rows matching every predicate, in primary-key order.
    pub fn filter(&self, criteria: &Criteria) -> Result<Vec<R>, PathwayError> {
        let clause = filter::compile(R::FILTERS, criteria)?;
        let mut sql = format!(
            "SELECT {} FROM {}{} ORDER BY {}, {}",
            R::COLUMNS.join(", "),
            R::TABLE,
            clause.sql,
            R::KEY.0,
            R::KEY.1
        );
        let mut params = clause.params;
        if let Some(limit) = criteria.limit_value() {
            sql.push_str(" LIMIT ?");
            params.push(Value::Integer(limit as i64));
        }
        self.select(&sql, params)
    }

    pub fn query_by_gene(&self, gene: &str, id_type: GeneIdType) -> Result<Vec<R>, PathwayError> {
        let column = match id_type {
            GeneIdType::Symbol => R::GENE_SYMBOL_COLUMN,
            GeneIdType::Id => R::KEY.0,
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE {column} = ? ORDER BY {}, {}",
            R::COLUMNS.join(", "),
            R::TABLE,
            R::KEY.0,
            R::KEY.1
        );
        self.select(&sql, vec![Value::Text(gene.trim().to_string())])
    }

    /// Rows annotated with any of `ids` (pathway, GO term or gene set).
    pub fn query_by_annotation<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<R>, PathwayError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM {} WHERE {} IN ({placeholders}) ORDER BY {}, {}",
            R::COLUMNS.join(", "),
            R::TABLE,
            R::KEY.1,
            R::KEY.0,
            R::KEY.1
        );
        let params = ids
            .iter()
            .map(|id| Value::Text(id.as_ref().trim().to_string()))
            .collect();
        self.select(&sql, params)
    }

    pub fn stats(&self) -> Result<StoreStats, PathwayError> {
        let (gene, annotation) = R::KEY;
        let name = R::NAME_COLUMN;
        let sql = format!(
            "SELECT COUNT(*), COUNT(DISTINCT {gene}), COUNT(DISTINCT {annotation}), \
             COALESCE(SUM(CASE WHEN {name} IS NULL OR {name} = '' THEN 1 ELSE 0 END), 0) \
             FROM {}",
            R::TABLE
        );
        let (total, unique_genes, unique_annotations, missing_names) = self
            .conn
            .query_row(&sql, [], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .map_err(db_err)?;

        let group = R::GROUP_COLUMN;
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT COALESCE({group}, 'unknown'), COUNT(*) FROM {} GROUP BY 1 ORDER BY 1",
                R::TABLE
            ))
            .map_err(db_err)?;
        let groups = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))
            .map_err(db_err)?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()
            .map_err(db_err)?;

        Ok(StoreStats {
            total: total as u64,
            unique_genes: unique_genes as u64,
            unique_annotations: unique_annotations as u64,
            missing_names: missing_names as u64,
            groups,
        })
    }

    /// Annotation id to the sorted, distinct gene symbols annotated with it.
    pub fn to_gene_sets(&self) -> Result<BTreeMap<String, Vec<String>>, PathwayError> {
        let sql = format!(
            "SELECT DISTINCT {annotation}, {symbol} FROM {table} \
             WHERE {symbol} IS NOT NULL AND {symbol} != '' ORDER BY {annotation}, {symbol}",
            annotation = R::KEY.1,
            symbol = R::GENE_SYMBOL_COLUMN,
            table = R::TABLE
        );
        let mut stmt = self.conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(db_err)?;
        let mut sets: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for row in rows {
            let (annotation, symbol) = row.map_err(db_err)?;
            sets.entry(annotation).or_default().push(symbol);
        }
        Ok(sets)
    }

    /// Fixed-column table ordered by gene symbol, then annotation id.
    pub fn export(&self, limit: Option<usize>) -> Result<ExportTable, PathwayError> {
        let mut sql = format!(
            "SELECT {} FROM {} ORDER BY {}, {}",
            R::COLUMNS.join(", "),
            R::TABLE,
            R::GENE_SYMBOL_COLUMN,
            R::KEY.1
        );
        let mut params = Vec::new();
        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            params.push(Value::Integer(limit as i64));
        }
        let rows = self.select(&sql, params)?;
        Ok(ExportTable {
            headers: R::EXPORT_HEADERS.iter().map(|h| h.to_string()).collect(),
            rows: rows.iter().map(R::export_row).collect(),
        })
    }

    /// Distinct annotation ids whose name is still missing.
    pub fn missing_name_ids(&self) -> Result<Vec<String>, PathwayError> {
        let sql = format!(
            "SELECT DISTINCT {id} FROM {table} WHERE {name} IS NULL OR {name} = '' ORDER BY {id}",
            id = R::KEY.1,
            name = R::NAME_COLUMN,
            table = R::TABLE
        );
        let mut stmt = self.conn.prepare(&sql).map_err(db_err)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(ids)
    }

    /// Fills in names for rows that have none. Returns the rows changed.
    pub fn set_missing_names(&mut self, names: &HashMap<String, String>) -> Result<usize, PathwayError> {
        if names.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE {table} SET {name} = ?1 WHERE {id} = ?2 AND ({name} IS NULL OR {name} = '')",
            id = R::KEY.1,
            name = R::NAME_COLUMN,
            table = R::TABLE
        );
        let tx = self.conn.transaction().map_err(db_err)?;
        let mut updated = 0usize;
        {
            let mut stmt = tx.prepare(&sql).map_err(db_err)?;
            for (id, name) in names {
                updated += stmt.execute(params![name, id]).map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)?;
        Ok(updated)
    }

    /// Names rows that lack one: bundled names first, then `lookup` in
    /// batches for whatever the bundled table does not know.
    ///
    /// Only rows still missing a name are touched, so a rerun after a
    /// complete pass makes no lookup calls.
    pub fn populate_descriptions(
        &mut self,
        bundled: &TermNames,
        lookup: Option<&dyn DescriptionLookup>,
    ) -> Result<BackfillReport, PathwayError> {
        let missing = self.missing_name_ids()?;
        let mut report = BackfillReport {
            missing: missing.len(),
            ..BackfillReport::default()
        };
        if missing.is_empty() {
            return Ok(report);
        }

        let mut known = HashMap::new();
        let mut remote = Vec::new();
        for id in missing {
            match bundled.get(&id) {
                Some(name) => {
                    known.insert(id, name.to_string());
                }
                None => remote.push(id),
            }
        }
        report.from_bundled = known.len();
        report.rows_updated += self.set_missing_names(&known)?;

        if let Some(lookup) = lookup {
            for batch in remote.chunks(LOOKUP_BATCH_SIZE) {
                let names = lookup
                    .lookup(batch)?
                    .into_iter()
                    .filter(|(id, name)| batch.contains(id) && !name.trim().is_empty())
                    .collect::<HashMap<_, _>>();
                report.lookup_batches += 1;
                report.from_lookup += names.len();
                report.rows_updated += self.set_missing_names(&names)?;
            }
        }
        report.unresolved = report.missing - report.from_bundled - report.from_lookup;
        tracing::info!(
            path = %self.path,
            missing = report.missing,
            bundled = report.from_bundled,
            looked_up = report.from_lookup,
            unresolved = report.unresolved,
            "populated descriptions"
        );
        Ok(report)
    }

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>, PathwayError> {
        self.metadata_value(key).map_err(db_err)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<(), PathwayError> {
        self.write_metadata(key, value).map_err(db_err)
    }

    fn metadata_value(&self, key: &str) -> rusqlite::Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
                row.get::<_, Option<String>>(0)
            })
            .optional()
            .map(Option::flatten)
    }

    fn write_metadata(&self, key: &str, value: &str) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn select(&self, sql: &str, params: Vec<Value>) -> Result<Vec<R>, PathwayError> {
        let mut stmt = self.conn.prepare(sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(params), R::from_row)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(rows)
    }
}

fn insert_sql<R: AnnotationRecord>() -> String {
    let placeholders = vec!["?"; R::COLUMNS.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        R::TABLE,
        R::COLUMNS.join(", ")
    )
}

fn upsert_sql<R: AnnotationRecord>() -> String {
    let updates = R::COLUMNS
        .iter()
        .filter(|column| **column != R::KEY.0 && **column != R::KEY.1)
        .map(|column| {
            if *column == R::NAME_COLUMN {
                format!("{column} = COALESCE(excluded.{column}, {}.{column})", R::TABLE)
            } else {
                format!("{column} = excluded.{column}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{} ON CONFLICT({}, {}) DO UPDATE SET {updates}",
        insert_sql::<R>(),
        R::KEY.0,
        R::KEY.1
    )
}

fn db_err(err: rusqlite::Error) -> PathwayError {
    PathwayError::Database(err.to_string())
}

fn classify(path: &Utf8Path, err: rusqlite::Error) -> PathwayError {
    match err.sqlite_error_code() {
        Some(ErrorCode::NotADatabase) | Some(ErrorCode::DatabaseCorrupt) => {
            PathwayError::StoreCorruption {
                path: path.as_std_path().to_path_buf(),
                message: err.to_string(),
            }
        }
        _ => db_err(err),
    }
}

fn remove_store_file(path: &Utf8Path) -> Result<(), PathwayError> {
    for candidate in [path.to_path_buf(), Utf8PathBuf::from(format!("{path}-journal"))] {
        if candidate.as_std_path().exists() {
            fs::remove_file(candidate.as_std_path())
                .map_err(|err| PathwayError::Filesystem(err.to_string()))?;
        }
    }
    Ok(())
}

/// A store whose kind is only known at runtime.
#[derive(Debug)]
pub enum AnyDb {
    Kegg(KeggDb),
    Go(GoDb),
    Msigdb(MsigdbDb),
}

impl AnyDb {
    pub fn open(kind: DatasetKind, path: &Utf8Path) -> Result<Self, PathwayError> {
        Ok(match kind {
            DatasetKind::Kegg => AnyDb::Kegg(KeggDb::open(path)?),
            DatasetKind::Go => AnyDb::Go(GoDb::open(path)?),
            DatasetKind::Msigdb => AnyDb::Msigdb(MsigdbDb::open(path)?),
        })
    }

    pub fn stats(&self) -> Result<StoreStats, PathwayError> {
        match self {
            AnyDb::Kegg(db) => db.stats(),
            AnyDb::Go(db) => db.stats(),
            AnyDb::Msigdb(db) => db.stats(),
        }
    }

    /// Filters with `key=value` pairs and returns rows as JSON objects.
    pub fn filter_pairs<S: AsRef<str>>(
        &self,
        pairs: &[S],
        limit: Option<usize>,
    ) -> Result<Vec<serde_json::Value>, PathwayError> {
        match self {
            AnyDb::Kegg(db) => filter_to_json(db, pairs, limit),
            AnyDb::Go(db) => filter_to_json(db, pairs, limit),
            AnyDb::Msigdb(db) => filter_to_json(db, pairs, limit),
        }
    }

    /// Rows for one gene as JSON objects.
    pub fn gene_rows(
        &self,
        gene: &str,
        id_type: GeneIdType,
    ) -> Result<Vec<serde_json::Value>, PathwayError> {
        match self {
            AnyDb::Kegg(db) => to_json(&db.query_by_gene(gene, id_type)?),
            AnyDb::Go(db) => to_json(&db.query_by_gene(gene, id_type)?),
            AnyDb::Msigdb(db) => to_json(&db.query_by_gene(gene, id_type)?),
        }
    }

    pub fn export(&self, limit: Option<usize>) -> Result<ExportTable, PathwayError> {
        match self {
            AnyDb::Kegg(db) => db.export(limit),
            AnyDb::Go(db) => db.export(limit),
            AnyDb::Msigdb(db) => db.export(limit),
        }
    }

    pub fn populate_descriptions(
        &mut self,
        bundled: &TermNames,
        lookup: Option<&dyn DescriptionLookup>,
    ) -> Result<BackfillReport, PathwayError> {
        match self {
            AnyDb::Kegg(db) => db.populate_descriptions(bundled, lookup),
            AnyDb::Go(db) => db.populate_descriptions(bundled, lookup),
            AnyDb::Msigdb(db) => db.populate_descriptions(bundled, lookup),
        }
    }
}

fn filter_to_json<R: AnnotationRecord, S: AsRef<str>>(
    db: &AnnotationDb<R>,
    pairs: &[S],
    limit: Option<usize>,
) -> Result<Vec<serde_json::Value>, PathwayError> {
    let mut criteria = Criteria::from_pairs(R::FILTERS, pairs)?;
    if let Some(limit) = limit {
        criteria = criteria.limit(limit);
    }
    to_json(&db.filter(&criteria)?)
}

fn to_json<R: AnnotationRecord>(records: &[R]) -> Result<Vec<serde_json::Value>, PathwayError> {
    records
        .iter()
        .map(|record| {
            serde_json::to_value(record).map_err(|err| PathwayError::Database(err.to_string()))
        })
        .collect()
}

/// Opens the store at `path` as `kind` and returns its stats.
pub fn stats_for_path(kind: DatasetKind, path: &Utf8Path) -> Result<StoreStats, PathwayError> {
    AnyDb::open(kind, path)?.stats()
}
