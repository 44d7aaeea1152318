mod categorizer;
mod cli;
mod db;
mod dimensions;
mod error;
mod fmt;
mod importer;
mod jobs;
mod ledger;
mod models;
mod normalizer;
mod provider;
mod settings;
mod sync;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, JobsCommands};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Import { file, kind, wait } => cli::import::run(&file, &kind, wait),
        Commands::Jobs { command } => match command {
            JobsCommands::Status { id } => cli::jobs::status(&id),
            JobsCommands::List => cli::jobs::list(),
        },
        Commands::Sync { account, from, to, force } => {
            cli::sync::run(account.as_deref(), from.as_deref(), to.as_deref(), force)
        }
        Commands::Accounts => cli::accounts::run(),
        Commands::Status => cli::status::run(),
        Commands::Demo => cli::demo::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
