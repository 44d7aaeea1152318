use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;
use crate::models::Flow;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS origins (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS banks (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    flow TEXT NOT NULL,
    major_category TEXT NOT NULL,
    category TEXT NOT NULL,
    sub_category TEXT NOT NULL DEFAULT '',
    created_at TEXT DEFAULT (datetime('now')),
    UNIQUE (flow, major_category, category, sub_category)
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    date TEXT NOT NULL,
    flow TEXT NOT NULL,
    income_amount REAL,
    outgoing_amount REAL,
    description TEXT NOT NULL,
    origin_id INTEGER NOT NULL,
    bank_id INTEGER NOT NULL,
    category_id INTEGER NOT NULL,
    external_id TEXT UNIQUE,
    month_name TEXT NOT NULL,
    year INTEGER NOT NULL,
    categorization_confidence REAL NOT NULL DEFAULT 0,
    is_machine_categorized INTEGER NOT NULL DEFAULT 0,
    is_human_validated INTEGER NOT NULL DEFAULT 0,
    raw_payload TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (origin_id) REFERENCES origins(id),
    FOREIGN KEY (bank_id) REFERENCES banks(id),
    FOREIGN KEY (category_id) REFERENCES categories(id)
);

CREATE TABLE IF NOT EXISTS rules (
    id INTEGER PRIMARY KEY,
    pattern TEXT NOT NULL,
    match_type TEXT NOT NULL DEFAULT 'contains',
    flow TEXT NOT NULL,
    major_category TEXT NOT NULL,
    category TEXT NOT NULL,
    sub_category TEXT NOT NULL DEFAULT '',
    confidence REAL NOT NULL DEFAULT 0.9,
    priority INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS sync_runs (
    id INTEGER PRIMARY KEY,
    account_id TEXT NOT NULL,
    date_from TEXT NOT NULL,
    date_to TEXT NOT NULL,
    created_count INTEGER NOT NULL DEFAULT 0,
    updated_count INTEGER NOT NULL DEFAULT 0,
    error_count INTEGER NOT NULL DEFAULT 0,
    forced INTEGER NOT NULL DEFAULT 0,
    started_at TEXT DEFAULT (datetime('now'))
);
";

// (pattern, match_type, flow, major_category, category, confidence)
const DEFAULT_RULES: &[(&str, &str, &str, &str, &str, f64)] = &[
    ("SALARY", "contains", "INFLOW", "Income", "Salary", 0.95),
    ("PAYROLL", "contains", "INFLOW", "Income", "Salary", 0.9),
    ("INTEREST", "contains", "INFLOW", "Income", "Interest", 0.85),
    ("REFUND", "contains", "INFLOW", "Income", "Refunds", 0.7),
    ("MORTGAGE", "contains", "OUTFLOW", "Housing", "Mortgage", 0.95),
    ("RENT", "starts_with", "OUTFLOW", "Housing", "Rent", 0.85),
    ("ELECTRIC", "contains", "OUTFLOW", "Housing", "Utilities", 0.85),
    ("WATER BILL", "contains", "OUTFLOW", "Housing", "Utilities", 0.85),
    ("GROCER", "contains", "OUTFLOW", "Food", "Groceries", 0.85),
    ("SUPERMARKET", "contains", "OUTFLOW", "Food", "Groceries", 0.85),
    ("RESTAURANT", "contains", "OUTFLOW", "Food", "Dining Out", 0.8),
    ("PHARMACY", "contains", "OUTFLOW", "Health", "Pharmacy", 0.85),
    ("FUEL", "contains", "OUTFLOW", "Transport", "Fuel", 0.85),
    ("UBER", "starts_with", "OUTFLOW", "Transport", "Rideshare", 0.8),
    ("NETFLIX", "contains", "OUTFLOW", "Leisure", "Streaming", 0.9),
    ("SPOTIFY", "contains", "OUTFLOW", "Leisure", "Streaming", 0.9),
    (r"^AMZN|^AMAZON", "regex", "OUTFLOW", "Shopping", "Online", 0.75),
];

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")?;
    Ok(conn)
}

/// Creates the schema and seeds the rows ingestion depends on. The Unknown
/// category for each flow must exist before any batch runs; the categorizer
/// falls back to it unconditionally.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    for flow in [Flow::Inflow, Flow::Outflow] {
        conn.execute(
            "INSERT OR IGNORE INTO categories (flow, major_category, category, sub_category) \
             VALUES (?1, 'Unknown', 'Unknown', '')",
            [flow.as_str()],
        )?;
    }

    let rule_count: i64 = conn.query_row("SELECT count(*) FROM rules", [], |row| row.get(0))?;
    if rule_count == 0 {
        for rule in DEFAULT_RULES {
            conn.execute(
                "INSERT INTO rules (pattern, match_type, flow, major_category, category, confidence) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![rule.0, rule.1, rule.2, rule.3, rule.4, rule.5],
            )?;
        }
    }
    Ok(())
}
