use rusqlite::{Connection, OptionalExtension};

use crate::error::{PennyError, Result};
use crate::models::{CategoryKey, DraftTransaction};

/// Foreign references a draft transaction needs before it can be persisted.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedRefs {
    pub origin_id: i64,
    pub bank_id: i64,
    pub category_id: i64,
}

// Get-or-create against a unique natural key. `INSERT OR IGNORE` is the
// atomic insert-or-fetch: when two resolvers race on the same new key, one
// insert wins and both re-selects converge on that row. A conflict is a
// signal to re-fetch, never an error.
fn insert_or_fetch(
    conn: &Connection,
    select_sql: &str,
    insert_sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Option<i64>> {
    if let Some(id) = conn
        .query_row(select_sql, params, |row| row.get::<_, i64>(0))
        .optional()?
    {
        return Ok(Some(id));
    }
    conn.execute(insert_sql, params)?;
    Ok(conn
        .query_row(select_sql, params, |row| row.get::<_, i64>(0))
        .optional()?)
}

pub fn resolve_origin(conn: &Connection, name: &str) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PennyError::Validation("origin name is empty".to_string()));
    }
    insert_or_fetch(
        conn,
        "SELECT id FROM origins WHERE name = ?1",
        "INSERT OR IGNORE INTO origins (name) VALUES (?1)",
        &[&name],
    )?
    .ok_or_else(|| PennyError::NotFound(format!("origin '{name}' could not be created")))
}

pub fn resolve_bank(conn: &Connection, name: &str) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PennyError::Validation("bank name is empty".to_string()));
    }
    insert_or_fetch(
        conn,
        "SELECT id FROM banks WHERE name = ?1",
        "INSERT OR IGNORE INTO banks (name) VALUES (?1)",
        &[&name],
    )?
    .ok_or_else(|| PennyError::NotFound(format!("bank '{name}' could not be created")))
}

pub fn resolve_category(conn: &Connection, key: &CategoryKey) -> Result<i64> {
    if key.major_category.trim().is_empty() || key.category.trim().is_empty() {
        return Err(PennyError::Validation("category key has empty components".to_string()));
    }
    insert_or_fetch(
        conn,
        "SELECT id FROM categories \
         WHERE flow = ?1 AND major_category = ?2 AND category = ?3 AND sub_category = ?4",
        "INSERT OR IGNORE INTO categories (flow, major_category, category, sub_category) \
         VALUES (?1, ?2, ?3, ?4)",
        &[
            &key.flow.as_str(),
            &key.major_category,
            &key.category,
            &key.sub_category,
        ],
    )?
    .ok_or_else(|| {
        PennyError::NotFound(format!(
            "category ({}, {}, {}, {}) could not be created",
            key.flow.as_str(),
            key.major_category,
            key.category,
            key.sub_category
        ))
    })
}

/// Resolves every dimension reference a categorized draft needs. The draft
/// must already carry a category key (the categorizer guarantees one).
pub fn resolve_all(conn: &Connection, draft: &DraftTransaction) -> Result<ResolvedRefs> {
    let key = draft
        .category_key
        .as_ref()
        .ok_or_else(|| PennyError::Validation("draft has no category key".to_string()))?;
    Ok(ResolvedRefs {
        origin_id: resolve_origin(conn, &draft.origin)?,
        bank_id: resolve_bank(conn, &draft.bank)?,
        category_id: resolve_category(conn, key)?,
    })
}
