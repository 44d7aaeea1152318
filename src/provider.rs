use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{PennyError, Result};

/// One account known to the bank-data integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderAccount {
    pub id: String,
    pub name: String,
    /// Institution name, used as the bank dimension key for synced rows.
    pub institution: String,
    /// Account holder, used as the origin dimension key for synced rows.
    pub holder: String,
    pub currency: String,
    pub balance: f64,
}

/// A raw transaction as returned by the bank-data provider. Amounts are
/// signed: negative means money leaving the account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderTransaction {
    pub transaction_id: String,
    pub booking_date: String,
    pub amount: f64,
    #[serde(default)]
    pub remittance_info: Option<String>,
    #[serde(default)]
    pub counterparty_name: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// The authenticated bank-data API, reached only through this seam so the
/// sync path can run against fixtures in tests.
pub trait BankDataProvider {
    fn list_accounts(&self) -> Result<Vec<ProviderAccount>>;

    fn fetch_transactions(
        &self,
        account_id: &str,
        date_from: &str,
        date_to: &str,
    ) -> Result<Vec<ProviderTransaction>>;
}

/// File-backed provider: `accounts.json` plus one `<account_id>.json` per
/// account under the provider directory. Stands in for the real HTTP client.
pub struct FileProvider {
    dir: PathBuf,
}

impl FileProvider {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, file: &str, account: &str) -> Result<T> {
        let path = self.dir.join(file);
        let content = std::fs::read_to_string(&path).map_err(|e| PennyError::Provider {
            account: account.to_string(),
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        serde_json::from_str(&content).map_err(|e| PennyError::Provider {
            account: account.to_string(),
            message: format!("malformed {}: {e}", path.display()),
        })
    }
}

impl BankDataProvider for FileProvider {
    fn list_accounts(&self) -> Result<Vec<ProviderAccount>> {
        self.read_json("accounts.json", "*")
    }

    fn fetch_transactions(
        &self,
        account_id: &str,
        date_from: &str,
        date_to: &str,
    ) -> Result<Vec<ProviderTransaction>> {
        let all: Vec<ProviderTransaction> =
            self.read_json(&format!("{account_id}.json"), account_id)?;
        // ISO dates compare lexicographically; the window is inclusive.
        Ok(all
            .into_iter()
            .filter(|t| t.booking_date.as_str() >= date_from && t.booking_date.as_str() <= date_to)
            .collect())
    }
}
