use colored::Colorize;

use crate::db::get_connection;
use crate::error::Result;
use crate::provider::FileProvider;
use crate::settings::{get_data_dir, get_provider_dir};
use crate::sync::{default_window, sync_account_by_id, sync_all_accounts};

pub fn run(account: Option<&str>, from: Option<&str>, to: Option<&str>, force: bool) -> Result<()> {
    let conn = get_connection(&get_data_dir().join("penny.db"))?;
    let provider = FileProvider::new(get_provider_dir());

    let (default_from, default_to) = default_window();
    let date_from = from.unwrap_or(&default_from);
    let date_to = to.unwrap_or(&default_to);
    println!("Window: {date_from} .. {date_to}");

    let (accounts_processed, created, updated, errors) = match account {
        Some(account_id) => {
            let report = sync_account_by_id(&conn, &provider, account_id, date_from, date_to, force)?;
            (1, report.created, report.updated, report.errors)
        }
        None => {
            let report = sync_all_accounts(&conn, &provider, date_from, date_to, force)?;
            (report.accounts_processed, report.created, report.updated, report.errors)
        }
    };

    println!("{accounts_processed} account(s): {created} created, {updated} updated");
    if errors.is_empty() {
        println!("{}", "No errors.".green());
    } else {
        println!("{}", format!("{} error(s):", errors.len()).red());
        for error in &errors {
            println!("  {error}");
        }
    }
    Ok(())
}
