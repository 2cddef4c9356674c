//! medsync CLI - keep medication, supplement, diet and doctor records offline
//! and push them to a remote document store when a connection is available.

mod cli;
mod commands;
mod config_profiles;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::common::{resolve_db_path, resolve_owner, resolve_sync_settings};
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::list::run_list;
use crate::commands::show::run_show;
use crate::commands::status::run_status;
use crate::commands::sync::{run_conflicts, run_pull, run_sync};
use crate::commands::update::run_update;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "medsync=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let profile = cli.profile.as_deref();
    let owner = cli.owner.as_deref();

    match cli.command {
        Commands::Add { kind, fields } => {
            let owner_id = resolve_owner(owner, profile)?;
            run_add(kind, &fields, &owner_id, &db_path).await?;
        }
        Commands::List { kind, limit, json } => {
            let owner_id = resolve_owner(owner, profile)?;
            run_list(kind, limit, json, &owner_id, &db_path).await?;
        }
        Commands::Show { kind, id } => run_show(kind, &id, &db_path).await?,
        Commands::Update { kind, id, fields } => run_update(kind, &id, &fields, &db_path).await?,
        Commands::Delete { kind, id } => run_delete(kind, &id, &db_path).await?,
        Commands::Sync { full } => {
            let settings = resolve_sync_settings(profile, owner)?;
            run_sync(full, &settings, &db_path).await?;
        }
        Commands::Pull => {
            let settings = resolve_sync_settings(profile, owner)?;
            run_pull(&settings, &db_path).await?;
        }
        Commands::Status { json } => {
            let settings = match resolve_sync_settings(profile, owner) {
                Ok(settings) => Some(settings),
                Err(CliError::SyncNotConfigured | CliError::OwnerNotConfigured) => None,
                Err(error) => return Err(error),
            };
            run_status(settings.as_ref(), json, &db_path).await?;
        }
        Commands::Conflicts { limit, json } => run_conflicts(limit, json, &db_path).await?,
        Commands::Watch => {
            let settings = resolve_sync_settings(profile, owner)?;
            run_watch(&settings, &db_path).await?;
        }
        Commands::Config { command } => run_config(command, profile)?,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }

    Ok(())
}
