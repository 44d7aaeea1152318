use chrono::{Duration, Utc};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::categorizer::RuleScorer;
use crate::error::{PennyError, Result};
use crate::ledger::{ingest, UpsertOutcome};
use crate::normalizer::normalize_provider;
use crate::provider::{BankDataProvider, ProviderAccount};

#[derive(Debug, Default)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Default)]
pub struct SyncAllReport {
    pub accounts_processed: usize,
    pub created: usize,
    pub updated: usize,
    pub errors: Vec<String>,
}

/// The 30 days up to now, used when the caller supplies no window.
pub fn default_window() -> (String, String) {
    let today = Utc::now().date_naive();
    let from = today - Duration::days(30);
    (from.format("%Y-%m-%d").to_string(), today.format("%Y-%m-%d").to_string())
}

fn record_sync_run(
    conn: &Connection,
    account_id: &str,
    date_from: &str,
    date_to: &str,
    report: &SyncReport,
    forced: bool,
) -> Result<()> {
    conn.execute(
        "INSERT INTO sync_runs (account_id, date_from, date_to, created_count, updated_count, error_count, forced) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            account_id,
            date_from,
            date_to,
            report.created as i64,
            report.updated as i64,
            report.errors.len() as i64,
            forced,
        ],
    )?;
    Ok(())
}

/// Synchronizes one account: fetches the provider window and runs every
/// transaction through the shared normalize → categorize → resolve → upsert
/// path. A record's failure lands in `errors` and the rest of the window
/// keeps going. Blocks the caller until the window is done.
pub fn sync_account(
    conn: &Connection,
    provider: &dyn BankDataProvider,
    account: &ProviderAccount,
    date_from: &str,
    date_to: &str,
    forced: bool,
) -> Result<SyncReport> {
    let transactions = provider.fetch_transactions(&account.id, date_from, date_to)?;
    info!(
        account = %account.id,
        date_from,
        date_to,
        forced,
        fetched = transactions.len(),
        "syncing account"
    );

    let scorer = RuleScorer::new(conn);
    let mut report = SyncReport::default();
    for txn in &transactions {
        let step = normalize_provider(account, txn)
            .and_then(|draft| ingest(conn, draft, &scorer));
        match step {
            Ok(UpsertOutcome::Created) => report.created += 1,
            Ok(UpsertOutcome::Updated) => report.updated += 1,
            Err(e) => {
                warn!(account = %account.id, transaction = %txn.transaction_id, error = %e, "record failed");
                report.errors.push(format!("{}: {e}", txn.transaction_id));
            }
        }
    }

    record_sync_run(conn, &account.id, date_from, date_to, &report, forced)?;
    info!(
        account = %account.id,
        created = report.created,
        updated = report.updated,
        errors = report.errors.len(),
        "account sync finished"
    );
    Ok(report)
}

/// Looks an account up by id before syncing it.
pub fn sync_account_by_id(
    conn: &Connection,
    provider: &dyn BankDataProvider,
    account_id: &str,
    date_from: &str,
    date_to: &str,
    forced: bool,
) -> Result<SyncReport> {
    let account = provider
        .list_accounts()?
        .into_iter()
        .find(|a| a.id == account_id)
        .ok_or_else(|| PennyError::NotFound(format!("connected account '{account_id}'")))?;
    sync_account(conn, provider, &account, date_from, date_to, forced)
}

/// Synchronizes every connected account, summing counts. A whole-account
/// failure becomes one error entry attributed to that account; the
/// remaining accounts still run.
pub fn sync_all_accounts(
    conn: &Connection,
    provider: &dyn BankDataProvider,
    date_from: &str,
    date_to: &str,
    forced: bool,
) -> Result<SyncAllReport> {
    let accounts = provider.list_accounts()?;
    let mut report = SyncAllReport::default();

    for account in &accounts {
        match sync_account(conn, provider, account, date_from, date_to, forced) {
            Ok(account_report) => {
                report.accounts_processed += 1;
                report.created += account_report.created;
                report.updated += account_report.updated;
                report.errors.extend(
                    account_report.errors.into_iter().map(|e| format!("{}: {e}", account.id)),
                );
            }
            Err(e) => {
                warn!(account = %account.id, error = %e, "account sync failed");
                report.errors.push(format!("{}: {e}", account.id));
            }
        }
    }

    info!(
        accounts = report.accounts_processed,
        created = report.created,
        updated = report.updated,
        errors = report.errors.len(),
        "sync run finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};
    use crate::provider::{FileProvider, ProviderTransaction};
    use std::path::Path;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn account(id: &str) -> ProviderAccount {
        ProviderAccount {
            id: id.into(),
            name: format!("Account {id}"),
            institution: "First Bank".into(),
            holder: "Family".into(),
            currency: "EUR".into(),
            balance: 0.0,
        }
    }

    fn write_provider_fixtures(dir: &Path, txns_for_acct1: &[ProviderTransaction]) -> FileProvider {
        let accounts = vec![account("acct-1"), account("acct-2")];
        std::fs::write(dir.join("accounts.json"), serde_json::to_string(&accounts).unwrap()).unwrap();
        std::fs::write(dir.join("acct-1.json"), serde_json::to_string(txns_for_acct1).unwrap()).unwrap();
        std::fs::write(dir.join("acct-2.json"), "[]").unwrap();
        FileProvider::new(dir.to_path_buf())
    }

    fn txn(id: &str, date: &str, amount: f64, remittance: &str) -> ProviderTransaction {
        ProviderTransaction {
            transaction_id: id.into(),
            booking_date: date.into(),
            amount,
            remittance_info: Some(remittance.into()),
            counterparty_name: None,
            note: None,
        }
    }

    #[test]
    fn test_flow_and_amount_mapping() {
        let (_db_dir, conn) = test_db();
        let fixtures = tempfile::tempdir().unwrap();
        let provider = write_provider_fixtures(
            fixtures.path(),
            &[
                txn("t1", "2024-01-05", -50.0, "CARD PAYMENT"),
                txn("t2", "2024-01-25", 1000.0, "SALARY JANUARY"),
            ],
        );

        let report =
            sync_account(&conn, &provider, &account("acct-1"), "2024-01-01", "2024-01-31", false)
                .unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.updated, 0);
        assert!(report.errors.is_empty());

        let (flow, income, outgoing): (String, Option<f64>, Option<f64>) = conn
            .query_row(
                "SELECT flow, income_amount, outgoing_amount FROM transactions WHERE external_id = 't1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(flow, "OUTFLOW");
        assert_eq!(income, None);
        assert_eq!(outgoing, Some(50.0));

        let (flow, income, outgoing): (String, Option<f64>, Option<f64>) = conn
            .query_row(
                "SELECT flow, income_amount, outgoing_amount FROM transactions WHERE external_id = 't2'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(flow, "INFLOW");
        assert_eq!(income, Some(1000.0));
        assert_eq!(outgoing, None);
    }

    #[test]
    fn test_resync_is_idempotent() {
        let (_db_dir, conn) = test_db();
        let fixtures = tempfile::tempdir().unwrap();
        let provider = write_provider_fixtures(
            fixtures.path(),
            &[
                txn("t1", "2024-01-05", -50.0, "CARD PAYMENT"),
                txn("t2", "2024-01-25", 1000.0, "SALARY JANUARY"),
            ],
        );
        let acct = account("acct-1");

        let first = sync_account(&conn, &provider, &acct, "2024-01-01", "2024-01-31", false).unwrap();
        let second = sync_account(&conn, &provider, &acct, "2024-01-01", "2024-01-31", false).unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, first.created);

        let rows: i64 = conn.query_row("SELECT count(*) FROM transactions", [], |r| r.get(0)).unwrap();
        assert_eq!(rows, 2, "overlapping windows must not duplicate");
    }

    #[test]
    fn test_resync_picks_up_changed_description() {
        let (_db_dir, conn) = test_db();
        let fixtures = tempfile::tempdir().unwrap();
        let acct = account("acct-1");

        write_provider_fixtures(fixtures.path(), &[txn("t1", "2024-01-05", -50.0, "PENDING CARD")]);
        let provider = FileProvider::new(fixtures.path().to_path_buf());
        sync_account(&conn, &provider, &acct, "2024-01-01", "2024-01-31", false).unwrap();
        let id_before: i64 = conn
            .query_row("SELECT id FROM transactions WHERE external_id = 't1'", [], |r| r.get(0))
            .unwrap();

        write_provider_fixtures(fixtures.path(), &[txn("t1", "2024-01-05", -50.0, "GROCER LTD SETTLED")]);
        let report = sync_account(&conn, &provider, &acct, "2024-01-01", "2024-01-31", false).unwrap();
        assert_eq!(report.updated, 1);

        let (id_after, desc): (i64, String) = conn
            .query_row(
                "SELECT id, description FROM transactions WHERE external_id = 't1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(id_after, id_before);
        assert_eq!(desc, "GROCER LTD SETTLED");
    }

    #[test]
    fn test_record_failure_does_not_stop_the_window() {
        let (_db_dir, conn) = test_db();
        let fixtures = tempfile::tempdir().unwrap();
        let provider = write_provider_fixtures(
            fixtures.path(),
            &[
                txn("t1", "2024-01-05", -50.0, "CARD PAYMENT"),
                txn("", "2024-01-06", -5.0, "NO EXTERNAL ID"),
                txn("t3", "2024-01-07", -7.5, "ANOTHER CARD PAYMENT"),
            ],
        );

        let report =
            sync_account(&conn, &provider, &account("acct-1"), "2024-01-01", "2024-01-31", false)
                .unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_account_failure_does_not_stop_siblings() {
        let (_db_dir, conn) = test_db();
        let fixtures = tempfile::tempdir().unwrap();
        write_provider_fixtures(fixtures.path(), &[txn("t1", "2024-01-05", -50.0, "CARD")]);
        // acct-2's transaction file disappears: a whole-account failure.
        std::fs::remove_file(fixtures.path().join("acct-2.json")).unwrap();
        let provider = FileProvider::new(fixtures.path().to_path_buf());

        let report = sync_all_accounts(&conn, &provider, "2024-01-01", "2024-01-31", false).unwrap();
        assert_eq!(report.accounts_processed, 1);
        assert_eq!(report.created, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("acct-2"), "error must name the failing account");
    }

    #[test]
    fn test_sync_by_unknown_account_id() {
        let (_db_dir, conn) = test_db();
        let fixtures = tempfile::tempdir().unwrap();
        let provider = write_provider_fixtures(fixtures.path(), &[]);
        let err = sync_account_by_id(&conn, &provider, "ghost", "2024-01-01", "2024-01-31", false);
        assert!(matches!(err, Err(PennyError::NotFound(_))));
    }

    #[test]
    fn test_sync_runs_are_recorded() {
        let (_db_dir, conn) = test_db();
        let fixtures = tempfile::tempdir().unwrap();
        let provider = write_provider_fixtures(fixtures.path(), &[txn("t1", "2024-01-05", -50.0, "CARD")]);
        sync_all_accounts(&conn, &provider, "2024-01-01", "2024-01-31", true).unwrap();
        let (runs, forced): (i64, i64) = conn
            .query_row("SELECT count(*), sum(forced) FROM sync_runs", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(runs, 2);
        assert_eq!(forced, 2);
    }

    #[test]
    fn test_default_window_is_30_days() {
        let (from, to) = default_window();
        let from = chrono::NaiveDate::parse_from_str(&from, "%Y-%m-%d").unwrap();
        let to = chrono::NaiveDate::parse_from_str(&to, "%Y-%m-%d").unwrap();
        assert_eq!((to - from).num_days(), 30);
    }
}
