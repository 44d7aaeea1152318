use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::fmt::money;
use crate::provider::{BankDataProvider, FileProvider};
use crate::settings::get_provider_dir;
use crate::sync::default_window;

/// Read-only view of the provider integration: identity, currency, latest
/// balance and recent activity per connected account.
pub fn run() -> Result<()> {
    let provider = FileProvider::new(get_provider_dir());
    let accounts = provider.list_accounts()?;
    let (date_from, date_to) = default_window();

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Institution", "Currency", "Balance", "Txns (30d)"]);
    for account in &accounts {
        let recent = provider
            .fetch_transactions(&account.id, &date_from, &date_to)
            .map(|txns| txns.len().to_string())
            .unwrap_or_else(|_| "?".to_string());
        table.add_row(vec![
            Cell::new(&account.id),
            Cell::new(&account.name),
            Cell::new(&account.institution),
            Cell::new(&account.currency),
            Cell::new(money(account.balance)),
            Cell::new(recent),
        ]);
    }
    println!("Connected accounts\n{table}");
    Ok(())
}
