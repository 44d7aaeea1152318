use chrono::{Duration, Utc};
use colored::Colorize;

use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::settings::{get_data_dir, get_provider_dir};

/// Writes sample provider fixtures (two accounts with a month of activity)
/// so sync and the accounts listing have something to work with.
pub fn run() -> Result<()> {
    let conn = get_connection(&get_data_dir().join("penny.db"))?;
    init_db(&conn)?;

    let provider_dir = get_provider_dir();
    std::fs::create_dir_all(&provider_dir)?;

    let today = Utc::now().date_naive();
    let day = |offset: i64| (today - Duration::days(offset)).format("%Y-%m-%d").to_string();

    let accounts = serde_json::json!([
        {
            "id": "demo-checking",
            "name": "Joint Checking",
            "institution": "First Demo Bank",
            "holder": "Family",
            "currency": "EUR",
            "balance": 2814.22
        },
        {
            "id": "demo-savings",
            "name": "Rainy Day Savings",
            "institution": "First Demo Bank",
            "holder": "Family",
            "currency": "EUR",
            "balance": 10250.00
        }
    ]);
    let checking = serde_json::json!([
        {"transaction_id": "demo-c-1", "booking_date": day(25), "amount": 2400.00,
         "remittance_info": "SALARY FEBRUARY", "counterparty_name": "ACME GMBH"},
        {"transaction_id": "demo-c-2", "booking_date": day(20), "amount": -86.40,
         "remittance_info": "SUPERMARKET CHECKOUT 14"},
        {"transaction_id": "demo-c-3", "booking_date": day(14), "amount": -12.99,
         "remittance_info": "NETFLIX.COM"},
        {"transaction_id": "demo-c-4", "booking_date": day(9), "amount": -54.10,
         "counterparty_name": "CITY FUEL STATION"},
        {"transaction_id": "demo-c-5", "booking_date": day(3), "amount": -240.00,
         "note": "dentist, no remittance text"}
    ]);
    let savings = serde_json::json!([
        {"transaction_id": "demo-s-1", "booking_date": day(15), "amount": 4.31,
         "remittance_info": "INTEREST CREDIT"}
    ]);

    std::fs::write(provider_dir.join("accounts.json"), serde_json::to_string_pretty(&accounts)?)?;
    std::fs::write(provider_dir.join("demo-checking.json"), serde_json::to_string_pretty(&checking)?)?;
    std::fs::write(provider_dir.join("demo-savings.json"), serde_json::to_string_pretty(&savings)?)?;

    println!("Sample provider data written to {}", provider_dir.display());
    println!("{}", "Try `penny accounts` and `penny sync`.".green());
    Ok(())
}
