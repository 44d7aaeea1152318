use rusqlite::OptionalExtension;

use crate::db::get_connection;
use crate::error::Result;
use crate::settings::load_settings;

pub fn run() -> Result<()> {
    let settings = load_settings();
    let data_dir = std::path::PathBuf::from(&settings.data_dir);
    let db_path = data_dir.join("penny.db");

    println!("Data dir:   {}", data_dir.display());
    println!("Database:   {}", db_path.display());

    if !db_path.exists() {
        println!();
        println!("Database not found. Run `penny init` to set up.");
        return Ok(());
    }

    let conn = get_connection(&db_path)?;
    let origins: i64 = conn.query_row("SELECT count(*) FROM origins", [], |r| r.get(0))?;
    let banks: i64 = conn.query_row("SELECT count(*) FROM banks", [], |r| r.get(0))?;
    let categories: i64 = conn.query_row("SELECT count(*) FROM categories", [], |r| r.get(0))?;
    let transactions: i64 = conn.query_row("SELECT count(*) FROM transactions", [], |r| r.get(0))?;
    let machine: i64 = conn.query_row(
        "SELECT count(*) FROM transactions WHERE is_machine_categorized = 1",
        [],
        |r| r.get(0),
    )?;

    println!();
    println!("Origins:       {origins}");
    println!("Banks:         {banks}");
    println!("Categories:    {categories}");
    println!("Transactions:  {transactions} ({machine} machine-categorized)");

    let last_sync: Option<(String, String, i64, i64, i64)> = conn
        .query_row(
            "SELECT account_id, started_at, created_count, updated_count, error_count \
             FROM sync_runs ORDER BY started_at DESC, id DESC LIMIT 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )
        .optional()?;
    match last_sync {
        Some((account, started_at, created, updated, errors)) => {
            println!();
            println!(
                "Last sync:     {account} at {started_at} ({created} created, {updated} updated, {errors} errors)"
            );
        }
        None => {
            println!();
            println!("Last sync:     never");
        }
    }
    Ok(())
}
