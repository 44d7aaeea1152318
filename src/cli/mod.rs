pub mod accounts;
pub mod demo;
pub mod import;
pub mod init;
pub mod jobs;
pub mod status;
pub mod sync;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "penny", about = "Family finance tracker: spreadsheet and bank-sync ingestion into one ledger.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up Penny: choose a data directory and initialize the ledger.
    Init {
        /// Path for Penny data (default: ~/Documents/penny)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Submit a CSV/XLSX import job; prints the job id immediately.
    Import {
        /// Path to the CSV or XLSX file to import
        file: String,
        /// What the rows are: origins, banks, categories or transactions
        #[arg(long)]
        kind: String,
        /// Block until the job is terminal and print the summary
        #[arg(long)]
        wait: bool,
    },
    /// Inspect import jobs.
    Jobs {
        #[command(subcommand)]
        command: JobsCommands,
    },
    /// Synchronize connected bank accounts into the ledger.
    Sync {
        /// Sync only this account (default: all connected accounts)
        #[arg(long)]
        account: Option<String>,
        /// Window start, YYYY-MM-DD (default: 30 days ago)
        #[arg(long)]
        from: Option<String>,
        /// Window end, YYYY-MM-DD (default: today)
        #[arg(long)]
        to: Option<String>,
        /// Force a fresh fetch from the provider
        #[arg(long)]
        force: bool,
    },
    /// List connected bank accounts and their recent activity.
    Accounts,
    /// Show the database location and ledger statistics.
    Status,
    /// Load sample provider fixtures so `penny sync` works out of the box.
    Demo,
}

#[derive(Subcommand)]
pub enum JobsCommands {
    /// Show one job's progress snapshot.
    Status {
        /// Job id returned by `penny import`
        id: String,
    },
    /// List all jobs known to this process.
    List,
}
