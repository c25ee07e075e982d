//! Drowsy CLI - record fatigue readings locally and sync them when online

mod cli;
mod commands;
mod config_file;
mod error;
mod token_store;


use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::auth_cmd::run_auth;
use crate::commands::capture::run_capture;
use crate::commands::clear::run_clear;
use crate::commands::common::resolve_db_path;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::list::run_list;
use crate::commands::range::run_range;
use crate::commands::stats::run_stats;
use crate::commands::sync::run_sync;
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
    if let Ok(directive) = "drowsy=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let Cli {
        command,
        db_path,
        config,
    } = Cli::parse();
    let config_path = config_file::resolve_config_path(config).map_err(CliError::Config)?;

    match command {
        Commands::Capture { readings } => {
            run_capture(&readings, &resolve_db_path(db_path)?).await?;
        }
        Commands::List {
            limit,
            policy,
            json,
        } => {
            let db_path = resolve_db_path(db_path)?;
            run_list(limit, policy.into(), json, &db_path, &config_path).await?;
        }
        Commands::Range {
            from,
            to,
            policy,
            json,
        } => {
            let db_path = resolve_db_path(db_path)?;
            run_range(&from, &to, policy.into(), json, &db_path, &config_path).await?;
        }
        Commands::Stats { from, to, json } => {
            run_stats(&from, &to, json, &resolve_db_path(db_path)?).await?;
        }
        Commands::Sync => run_sync(&resolve_db_path(db_path)?, &config_path).await?,
        Commands::Watch { threshold, offline } => {
            let db_path = resolve_db_path(db_path)?;
            run_watch(threshold, offline, &db_path, &config_path).await?;
        }
        Commands::Delete { id } => run_delete(&id, &resolve_db_path(db_path)?).await?,
        Commands::Clear { yes } => run_clear(yes, &resolve_db_path(db_path)?).await?,
        Commands::Config { command } => run_config(command, &config_path)?,
        Commands::Auth { command } => run_auth(command)?,
    }

    Ok(())
}
