use std::collections::HashMap;

use crate::error::{PennyError, Result};
use crate::models::{CategoryKey, DraftTransaction, Flow};
use crate::provider::{ProviderAccount, ProviderTransaction};

pub const DESCRIPTION_PLACEHOLDER: &str = "Imported transaction";

const UNKNOWN_DIMENSION: &str = "Unknown";

// ---------------------------------------------------------------------------
// Field parsing helpers
// ---------------------------------------------------------------------------

pub fn parse_amount(raw: &str) -> Option<f64> {
    let s = raw.replace(',', "").replace('"', "").replace('$', "").replace('€', "");
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        return inner.trim().parse::<f64>().ok().map(|v| -v);
    }
    s.parse().ok()
}

pub fn parse_date_iso(raw: &str) -> Option<String> {
    chrono::NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

pub fn parse_date_mdy(raw: &str) -> Option<String> {
    let parts: Vec<&str> = raw.trim().split('/').collect();
    if parts.len() != 3 {
        return None;
    }
    let m: u32 = parts[0].parse().ok()?;
    let d: u32 = parts[1].parse().ok()?;
    let y: i32 = parts[2].parse().ok()?;
    chrono::NaiveDate::from_ymd_opt(y, m, d).map(|dt| dt.format("%Y-%m-%d").to_string())
}

// Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug).
pub fn excel_serial_to_date(serial: f64) -> Option<String> {
    if !serial.is_finite() || serial <= 0.0 {
        return None;
    }
    let base = chrono::NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(chrono::Duration::days(serial.floor() as i64))
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// Accepts ISO dates, M/D/Y, or an Excel serial number (XLSX cells come back
/// as numeric strings).
pub fn parse_date_flexible(raw: &str) -> Option<String> {
    parse_date_iso(raw)
        .or_else(|| parse_date_mdy(raw))
        .or_else(|| raw.trim().parse::<f64>().ok().and_then(excel_serial_to_date))
}

/// Splits a stored date into its own calendar components. No timezone is
/// involved anywhere: the month/year always agree with the date string.
pub fn month_year(date: &str) -> Result<(String, i32)> {
    let parsed = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| PennyError::Validation(format!("unparseable date: {date}")))?;
    Ok((parsed.format("%B").to_string(), chrono::Datelike::year(&parsed)))
}

// First non-empty wins; the placeholder guarantees a description always
// exists.
fn description_chain(remittance: Option<&str>, counterparty: Option<&str>, note: Option<&str>) -> String {
    for candidate in [remittance, counterparty, note] {
        if let Some(text) = candidate {
            let text = text.trim();
            if !text.is_empty() {
                return text.to_string();
            }
        }
    }
    DESCRIPTION_PLACEHOLDER.to_string()
}

fn non_empty_or_unknown(value: Option<&String>) -> String {
    match value.map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(v) => v.to_string(),
        None => UNKNOWN_DIMENSION.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Maps one spreadsheet row (header name → cell text, keys lowercased by the
/// importer) into a draft. Spreadsheet rows carry an explicit flow column
/// and never an external id — re-uploads duplicate by design.
pub fn normalize_spreadsheet(fields: &HashMap<String, String>) -> Result<DraftTransaction> {
    let date_raw = fields.get("date").map(String::as_str).unwrap_or_default();
    if date_raw.trim().is_empty() {
        return Err(PennyError::Validation("missing date".to_string()));
    }
    let date = parse_date_flexible(date_raw)
        .ok_or_else(|| PennyError::Validation(format!("unparseable date: {date_raw}")))?;

    let flow_raw = fields.get("flow").map(String::as_str).unwrap_or_default();
    let flow = Flow::parse(flow_raw)
        .ok_or_else(|| PennyError::Validation(format!("missing or unknown flow: '{flow_raw}'")))?;

    let amount_raw = fields.get("amount").map(String::as_str).unwrap_or_default();
    let amount = parse_amount(amount_raw)
        .ok_or_else(|| PennyError::Validation(format!("missing or unparseable amount: '{amount_raw}'")))?;
    // Accounting exports write outgoing money as "(50.00)" or "-50.00". A
    // negative amount is taken as a magnitude when it agrees with the flow
    // column; on an inflow it contradicts the row and fails it.
    let amount = if amount < 0.0 {
        if flow != Flow::Outflow {
            return Err(PennyError::Validation(format!(
                "negative amount '{amount_raw}' contradicts flow {}",
                flow.as_str()
            )));
        }
        amount.abs()
    } else {
        amount
    };

    let description = description_chain(
        fields.get("description").map(String::as_str),
        fields.get("counterparty").map(String::as_str),
        fields.get("note").map(String::as_str),
    );

    let category_key = match fields.get("major_category").map(|v| v.trim()) {
        Some(major) if !major.is_empty() => Some(CategoryKey {
            flow,
            major_category: major.to_string(),
            category: fields
                .get("category")
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .unwrap_or(major)
                .to_string(),
            sub_category: fields.get("sub_category").map(|v| v.trim().to_string()).unwrap_or_default(),
        }),
        _ => None,
    };

    let (month_name, year) = month_year(&date)?;
    Ok(DraftTransaction {
        date,
        flow,
        amount,
        description,
        origin: non_empty_or_unknown(fields.get("origin")),
        bank: non_empty_or_unknown(fields.get("bank")),
        category_key,
        external_id: None,
        month_name,
        year,
        categorization_confidence: 0.0,
        is_machine_categorized: false,
        raw_payload: serde_json::to_value(fields)?,
    })
}

/// Maps one provider transaction into a draft. Flow is derived from the sign
/// of the raw amount; the external id makes re-sync idempotent downstream.
pub fn normalize_provider(
    account: &ProviderAccount,
    txn: &ProviderTransaction,
) -> Result<DraftTransaction> {
    if txn.booking_date.trim().is_empty() {
        return Err(PennyError::Validation("missing booking date".to_string()));
    }
    let date = parse_date_iso(&txn.booking_date)
        .ok_or_else(|| PennyError::Validation(format!("unparseable booking date: {}", txn.booking_date)))?;
    if txn.transaction_id.trim().is_empty() {
        return Err(PennyError::Validation("missing provider transaction id".to_string()));
    }
    if !txn.amount.is_finite() {
        return Err(PennyError::Validation("non-finite amount".to_string()));
    }

    let flow = if txn.amount < 0.0 { Flow::Outflow } else { Flow::Inflow };
    let description = description_chain(
        txn.remittance_info.as_deref(),
        txn.counterparty_name.as_deref(),
        txn.note.as_deref(),
    );

    let (month_name, year) = month_year(&date)?;
    Ok(DraftTransaction {
        date,
        flow,
        amount: txn.amount.abs(),
        description,
        origin: account.holder.clone(),
        bank: account.institution.clone(),
        category_key: None,
        external_id: Some(txn.transaction_id.clone()),
        month_name,
        year,
        categorization_confidence: 0.0,
        is_machine_categorized: false,
        raw_payload: serde_json::to_value(txn)?,
    })
}
