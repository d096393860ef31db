//! Command-line surface: argument parsing, logging setup, dispatch.

pub mod accounts;

use crate::accounts::AccountStore;
use crate::config::{resolve_state_dir, JgoogleConfig};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// jgoogle - Gmail, Calendar and Drive from the command line
#[derive(Parser, Debug)]
#[command(name = "jgoogle", version, about)]
pub struct Cli {
    /// State directory holding accounts.json and config.toml
    #[arg(long, global = true, env = "JGOOGLE_HOME")]
    pub home: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage stored Google accounts
    Accounts {
        #[command(subcommand)]
        action: AccountsCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum AccountsCommand {
    /// List stored accounts
    List,
    /// Authorize a new account and store its refresh token
    Add {
        /// Account email address
        id: String,
        /// Paste the authorization code instead of using a local callback listener
        #[arg(long)]
        manual: bool,
    },
    /// Delete a stored account
    Remove {
        /// Account email address
        id: String,
    },
    /// Print a valid access token for an account
    Token {
        /// Account email address
        id: String,
    },
}

/// Initialize tracing subscriber (stderr, so stdout stays tab-separated output)
pub fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "jgoogle=debug" } else { "jgoogle=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Execute the CLI command
pub async fn run(cli: Cli) -> Result<()> {
    let state_dir = resolve_state_dir(cli.home)?;
    let config = JgoogleConfig::load(&state_dir)?;
    let mut store = AccountStore::open(&state_dir).context("Failed to open account store")?;

    match cli.command {
        Commands::Accounts { action } => match action {
            AccountsCommand::List => accounts::handle_list(&store),
            AccountsCommand::Add { id, manual } => {
                accounts::handle_add(&mut store, &config, &id, manual).await
            }
            AccountsCommand::Remove { id } => accounts::handle_remove(&mut store, &id),
            AccountsCommand::Token { id } => {
                accounts::handle_token(&mut store, &config, &id).await
            }
        },
    }
}
