use rusqlite::{Connection, OptionalExtension};

use crate::categorizer::{categorize, CategoryScorer};
use crate::dimensions::{resolve_all, ResolvedRefs};
use crate::error::{PennyError, Result};
use crate::models::{DraftTransaction, Flow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

fn amounts(draft: &DraftTransaction) -> (Option<f64>, Option<f64>) {
    match draft.flow {
        Flow::Inflow => (Some(draft.amount), None),
        Flow::Outflow => (None, Some(draft.amount)),
    }
}

fn find_by_external_id(conn: &Connection, external_id: &str) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM transactions WHERE external_id = ?1",
            [external_id],
            |row| row.get(0),
        )
        .optional()?)
}

fn update_in_place(
    conn: &Connection,
    id: i64,
    draft: &DraftTransaction,
    refs: &ResolvedRefs,
    raw_payload: &str,
) -> Result<()> {
    let (income, outgoing) = amounts(draft);
    conn.execute(
        "UPDATE transactions SET \
             date = ?1, flow = ?2, income_amount = ?3, outgoing_amount = ?4, \
             description = ?5, category_id = ?6, month_name = ?7, year = ?8, \
             categorization_confidence = ?9, is_machine_categorized = ?10, \
             raw_payload = ?11, updated_at = datetime('now') \
         WHERE id = ?12",
        rusqlite::params![
            draft.date,
            draft.flow.as_str(),
            income,
            outgoing,
            draft.description,
            refs.category_id,
            draft.month_name,
            draft.year,
            draft.categorization_confidence,
            draft.is_machine_categorized,
            raw_payload,
            id,
        ],
    )?;
    Ok(())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Create-or-update against the canonical ledger. Provider-sourced drafts
/// (external id present) update the existing row in place, keeping its id;
/// spreadsheet drafts always insert — there is no key to deduplicate
/// against, so re-uploading a file duplicates by design.
pub fn upsert_transaction(
    conn: &Connection,
    draft: &DraftTransaction,
    refs: &ResolvedRefs,
) -> Result<UpsertOutcome> {
    let (income, outgoing) = amounts(draft);
    let raw_payload = serde_json::to_string(&draft.raw_payload)?;

    if let Some(external_id) = &draft.external_id {
        if let Some(id) = find_by_external_id(conn, external_id)? {
            update_in_place(conn, id, draft, refs, &raw_payload)?;
            return Ok(UpsertOutcome::Updated);
        }
    }

    let inserted = conn.execute(
        "INSERT INTO transactions \
             (date, flow, income_amount, outgoing_amount, description, origin_id, bank_id, \
              category_id, external_id, month_name, year, categorization_confidence, \
              is_machine_categorized, raw_payload) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        rusqlite::params![
            draft.date,
            draft.flow.as_str(),
            income,
            outgoing,
            draft.description,
            refs.origin_id,
            refs.bank_id,
            refs.category_id,
            draft.external_id,
            draft.month_name,
            draft.year,
            draft.categorization_confidence,
            draft.is_machine_categorized,
            raw_payload,
        ],
    );

    match inserted {
        Ok(_) => Ok(UpsertOutcome::Created),
        // Lost an insert race on the unique external id: another worker got
        // there first, so re-fetch and update that row instead.
        Err(e) if is_unique_violation(&e) && draft.external_id.is_some() => {
            let external_id = draft.external_id.as_deref().unwrap_or_default();
            let id = find_by_external_id(conn, external_id)?.ok_or_else(|| {
                PennyError::Conflict(format!("transaction external id '{external_id}'"))
            })?;
            update_in_place(conn, id, draft, refs, &raw_payload)?;
            Ok(UpsertOutcome::Updated)
        }
        Err(e) => Err(e.into()),
    }
}

/// Runs one draft through the shared tail of the pipeline:
/// categorize → resolve dimensions → upsert. Both the import worker and the
/// sync orchestrator go through here.
pub fn ingest(
    conn: &Connection,
    mut draft: DraftTransaction,
    scorer: &dyn CategoryScorer,
) -> Result<UpsertOutcome> {
    categorize(&mut draft, scorer)?;
    let refs = resolve_all(conn, &draft)?;
    upsert_transaction(conn, &draft, &refs)
}
