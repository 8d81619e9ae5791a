//! CSV table I/O for contact records.
//!
//! Input must carry exactly the seven contact columns, in order. Rows are
//! numbered from 1 in file order (header excluded). Cells are kept verbatim
//! as strings; empty cells stay empty.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};
use workflow::{Record, WorkflowError, COLUMNS};

const BOM: char = '\u{feff}';

/// Load and number every record in `path`.
///
/// A header that is not exactly [`COLUMNS`], or a row with a different
/// field count, is reported as [`WorkflowError::SchemaMismatch`].
pub fn load_records(path: &Path) -> Result<Vec<Record>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let records = parse_records(&content)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    info!(path = %path.display(), rows = records.len(), "Loaded input table");
    Ok(records)
}

/// Parse CSV text into numbered records.
pub fn parse_records(content: &str) -> Result<Vec<Record>> {
    let content = content.strip_prefix(BOM).unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = reader.records();
    let header = match rows.next() {
        Some(result) => result.context("CSV parse error in header")?,
        None => csv::StringRecord::new(),
    };
    let actual: Vec<String> = header.iter().map(|h| h.trim().to_string()).collect();
    if actual != COLUMNS {
        return Err(schema_mismatch(actual).into());
    }

    let mut records = Vec::new();
    for (idx, result) in rows.enumerate() {
        let row_number = idx as u32 + 1;
        let row = result.with_context(|| format!("CSV parse error at row {row_number}"))?;
        let cells: Vec<String> = row.iter().map(str::to_string).collect();
        let cells: [String; 7] = cells.try_into().map_err(|cells: Vec<String>| {
            debug!(row = row_number, fields = cells.len(), "Ragged row");
            WorkflowError::SchemaMismatch {
                expected: expected_columns(),
                actual: vec![format!("row {row_number}: {} fields", cells.len())],
            }
        })?;
        records.push(Record::from_cells(row_number, cells));
    }
    Ok(records)
}

fn expected_columns() -> Vec<String> {
    COLUMNS.iter().map(|c| c.to_string()).collect()
}

fn schema_mismatch(actual: Vec<String>) -> WorkflowError {
    WorkflowError::SchemaMismatch {
        expected: expected_columns(),
        actual,
    }
}

/// `<dir>/<stem><suffix><.ext>` next to `input`.
pub fn output_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    input.with_file_name(name)
}

/// Write `records` (already in output order) to `path`.
///
/// Rows go to a temporary sibling first and are renamed into place, so an
/// interrupted write never leaves a partial table at `path`.
pub fn write_records(path: &Path, records: &[Record]) -> Result<()> {
    let tmp_path = tmp_sibling(path);
    let result = write_to(&tmp_path, records).and_then(|()| {
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to move output into place at {}", path.display()))
    });
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    result?;
    info!(path = %path.display(), rows = records.len(), "Wrote output table");
    Ok(())
}

fn write_to(path: &Path, records: &[Record]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(COLUMNS)?;
    for record in records {
        writer
            .write_record(record.cells())
            .with_context(|| format!("Failed to write row {}", record.row_number))?;
    }
    writer.flush().context("Failed to flush output")?;
    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
