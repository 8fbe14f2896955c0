use std::io::{self, Write};

use serde::Serialize;

use crate::annotation::{ExportTable, StoreStats};
use crate::app::{
    BackfillResult, ClearResponsesResult, ClearResult, FetchResult, InfoResult, ListResult,
    ProgressEvent, ProgressSink, QueryResult, StatsResult,
};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_info(result: &InfoResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_clear(result: &ClearResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_query(result: &QueryResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_stats(result: &StatsResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_backfill(result: &BackfillResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_clear_responses(result: &ClearResponsesResult) -> io::Result<()> {
        Self::print_json(result)
    }

    /// One JSON object per row, keyed by the export headers.
    pub fn print_export(table: &ExportTable) -> io::Result<()> {
        Self::print_json(&table.records())
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Plain-text summaries for terminals; progress goes to stderr.
pub struct TextOutput;

impl TextOutput {
    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        for item in &result.items {
            let rows = item
                .rows
                .map(|rows| format!(" ({rows} rows)"))
                .unwrap_or_default();
            writeln!(stdout, "{} [{}]{rows}", item.key, item.action)?;
            if let Some(path) = &item.project_path {
                writeln!(stdout, "  project: {path}")?;
            }
            if let Some(path) = &item.cache_path {
                writeln!(stdout, "  cache:   {path}")?;
            }
        }
        Ok(())
    }

    pub fn print_list(result: &ListResult) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        if result.datasets.is_empty() {
            return writeln!(stdout, "no datasets");
        }
        for entry in &result.datasets {
            let mut location = Vec::new();
            if entry.project_path.is_some() {
                location.push("project");
            }
            if entry.cache_path.is_some() {
                location.push("cache");
            }
            writeln!(
                stdout,
                "{:<24} {:<7} {:<14} {}",
                entry.key,
                entry.kind,
                location.join("+"),
                entry.downloaded_at.as_deref().unwrap_or("-")
            )?;
        }
        Ok(())
    }

    pub fn print_info(result: &InfoResult) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{} ({})", result.key, result.kind)?;
        if let Some(path) = &result.project_path {
            writeln!(stdout, "project:       {path}")?;
        }
        if let Some(path) = &result.cache_path {
            writeln!(stdout, "cache:         {path}")?;
        }
        if let Some(at) = &result.downloaded_at {
            writeln!(stdout, "downloaded at: {at}")?;
        }
        if let Some(tool) = &result.tool {
            writeln!(stdout, "tool:          {tool}")?;
        }
        write_stats(&mut stdout, &result.stats)
    }

    pub fn print_clear(result: &ClearResult) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "project store cleared")?;
        if result.cache_cleared {
            writeln!(stdout, "shared cache stores cleared")?;
        }
        Ok(())
    }

    pub fn print_query(result: &QueryResult) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        for row in &result.rows {
            writeln!(stdout, "{row}")?;
        }
        writeln!(stdout, "{} rows from {}", result.count, result.path)
    }

    pub fn print_stats(result: &StatsResult) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{} ({})", result.key, result.path)?;
        write_stats(&mut stdout, &result.stats)
    }

    pub fn print_backfill(result: &BackfillResult) -> io::Result<()> {
        let report = &result.report;
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}: {} names missing", result.key, report.missing)?;
        writeln!(stdout, "  bundled:    {}", report.from_bundled)?;
        writeln!(
            stdout,
            "  lookup:     {} ({} batches)",
            report.from_lookup, report.lookup_batches
        )?;
        writeln!(stdout, "  updated:    {}", report.rows_updated)?;
        writeln!(stdout, "  unresolved: {}", report.unresolved)
    }

    pub fn print_clear_responses(result: &ClearResponsesResult) -> io::Result<()> {
        writeln!(io::stdout(), "removed {} cached responses", result.removed)
    }

    pub fn print_export(table: &ExportTable) -> io::Result<()> {
        table
            .write_tsv(&mut io::stdout().lock())
            .map_err(io::Error::other)
    }
}

fn write_stats(out: &mut impl Write, stats: &StoreStats) -> io::Result<()> {
    writeln!(out, "rows:          {}", stats.total)?;
    writeln!(out, "genes:         {}", stats.unique_genes)?;
    writeln!(out, "annotations:   {}", stats.unique_annotations)?;
    writeln!(out, "missing names: {}", stats.missing_names)?;
    for (group, count) in &stats.groups {
        writeln!(out, "  {group}: {count}")?;
    }
    Ok(())
}

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => eprintln!("{}", event.message),
        }
    }
}
