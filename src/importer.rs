use std::collections::HashMap;
use std::path::Path;

use calamine::Reader;
use rusqlite::Connection;

use crate::categorizer::CategoryScorer;
use crate::dimensions::{resolve_bank, resolve_category, resolve_origin};
use crate::error::{PennyError, Result};
use crate::ledger::ingest;
use crate::models::{CategoryKey, Flow, RecordKind};
use crate::normalizer::normalize_spreadsheet;

// ---------------------------------------------------------------------------
// Raw row reading
// ---------------------------------------------------------------------------

fn trim_cell(text: &str) -> String {
    text.trim().trim_start_matches('\u{feff}').trim().to_string()
}

fn normalize_header(raw: &str) -> String {
    trim_cell(raw)
        .to_lowercase()
        .replace([' ', '-'], "_")
        .replace("subcategory", "sub_category")
}

fn read_csv_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(trim_cell).collect());
    }
    Ok(rows)
}

fn read_xlsx_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut workbook = calamine::open_workbook_auto(path)
        .map_err(|e| PennyError::FatalJob(format!("cannot open spreadsheet: {e}")))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| PennyError::FatalJob("spreadsheet has no sheets".to_string()))?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| PennyError::FatalJob(format!("cannot read sheet '{sheet}': {e}")))?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(|cell| trim_cell(&cell.to_string())).collect())
        .collect())
}

fn required_columns(kind: RecordKind) -> &'static [&'static str] {
    match kind {
        RecordKind::Origins | RecordKind::Banks => &["name"],
        RecordKind::Categories => &["flow", "major_category", "category"],
        RecordKind::Transactions => &["date", "flow", "amount"],
    }
}

/// Reads a CSV/XLSX upload into field maps, one per data row, keyed by the
/// normalized header names. The header row is located by name so column
/// order does not matter. Any failure here is fatal to the whole job; the
/// file itself is unusable.
pub fn load_batch(path: &Path, kind: RecordKind) -> Result<Vec<HashMap<String, String>>> {
    if !path.is_file() {
        return Err(PennyError::FatalJob(format!("no such file: {}", path.display())));
    }
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let rows = match extension.as_str() {
        "csv" => read_csv_rows(path).map_err(|e| PennyError::FatalJob(e.to_string()))?,
        "xlsx" | "xls" => read_xlsx_rows(path)?,
        other => {
            return Err(PennyError::FatalJob(format!(
                "unsupported file format: .{other} (expected .csv or .xlsx)"
            )))
        }
    };

    let required = required_columns(kind);
    let header_idx = rows
        .iter()
        .position(|row| {
            let headers: Vec<String> = row.iter().map(|c| normalize_header(c)).collect();
            required.iter().all(|req| headers.iter().any(|h| h == req))
        })
        .ok_or_else(|| {
            PennyError::FatalJob(format!(
                "no header row with required columns: {}",
                required.join(", ")
            ))
        })?;

    let headers: Vec<String> = rows[header_idx].iter().map(|c| normalize_header(c)).collect();
    let mut records = Vec::new();
    for row in &rows[header_idx + 1..] {
        if row.iter().all(|c| c.is_empty()) {
            continue;
        }
        let mut fields = HashMap::new();
        for (idx, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            fields.insert(header.clone(), row.get(idx).cloned().unwrap_or_default());
        }
        records.push(fields);
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Record-kind dispatch
// ---------------------------------------------------------------------------

fn field<'a>(fields: &'a HashMap<String, String>, name: &str) -> &'a str {
    fields.get(name).map(String::as_str).unwrap_or_default().trim()
}

/// Processes one already-parsed record according to the batch's declared
/// kind. A `Validation`/`NotFound` error fails this record only; the caller
/// keeps going with the rest of the batch.
pub fn process_record(
    conn: &Connection,
    kind: RecordKind,
    fields: &HashMap<String, String>,
    scorer: &dyn CategoryScorer,
) -> Result<()> {
    match kind {
        RecordKind::Origins => {
            resolve_origin(conn, field(fields, "name"))?;
        }
        RecordKind::Banks => {
            resolve_bank(conn, field(fields, "name"))?;
        }
        RecordKind::Categories => {
            let flow = Flow::parse(field(fields, "flow")).ok_or_else(|| {
                PennyError::Validation(format!("missing or unknown flow: '{}'", field(fields, "flow")))
            })?;
            let major = field(fields, "major_category");
            let category = field(fields, "category");
            if major.is_empty() || category.is_empty() {
                return Err(PennyError::Validation(
                    "category rows need major_category and category".to_string(),
                ));
            }
            resolve_category(
                conn,
                &CategoryKey {
                    flow,
                    major_category: major.to_string(),
                    category: category.to_string(),
                    sub_category: field(fields, "sub_category").to_string(),
                },
            )?;
        }
        RecordKind::Transactions => {
            let draft = normalize_spreadsheet(fields)?;
            ingest(conn, draft, scorer)?;
        }
    }
    Ok(())
}
