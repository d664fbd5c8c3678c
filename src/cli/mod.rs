//! CLI module for Aigate
//!
//! Command-line interface definitions and handlers for the billing gateway.
//!
//! # Commands
//!
//! - `serve` - Start the gateway server
//! - `accounts` - Manage billing accounts (create, topup, show)
//! - `config` - Configuration utilities (init)
//!
//! # Example
//!
//! ```bash
//! # Start server with default config
//! aigate serve
//!
//! # Create an account with an opening balance and API key
//! aigate accounts create --name "Aruzhan" --email a@example.com --balance 500
//!
//! # Top up an account
//! aigate accounts topup 1 250 --description "Card payment"
//! ```

pub mod accounts;
pub mod config;
pub mod serve;

pub use config::handle_config_init;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Aigate - Metered billing gateway for LLM APIs
#[derive(Parser, Debug)]
#[command(
    name = "aigate",
    version,
    about = "Metered billing gateway in front of an OpenAI-compatible API"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the gateway server
    Serve(ServeArgs),
    /// Manage billing accounts
    #[command(subcommand)]
    Accounts(AccountsCommands),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "aigate.toml")]
    pub config: PathBuf,

    /// Override server port
    #[arg(short, long, env = "AIGATE_PORT")]
    pub port: Option<u16>,

    /// Override server host
    #[arg(short = 'H', long, env = "AIGATE_HOST")]
    pub host: Option<String>,

    /// Override database URL
    #[arg(long, env = "AIGATE_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "AIGATE_LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum AccountsCommands {
    /// Create an account and its first API key
    Create(AccountsCreateArgs),
    /// Credit an account balance
    Topup(AccountsTopupArgs),
    /// Show an account with its recent ledger
    Show(AccountsShowArgs),
}

#[derive(Args, Debug)]
pub struct AccountsCreateArgs {
    /// Account holder name
    #[arg(short, long)]
    pub name: String,

    /// Contact email (unique)
    #[arg(short, long)]
    pub email: String,

    /// Opening balance in ₸
    #[arg(short, long, default_value = "0")]
    pub balance: f64,

    /// Path to configuration file
    #[arg(short, long, default_value = "aigate.toml")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct AccountsTopupArgs {
    /// Account ID
    pub account_id: i64,

    /// Amount to credit in ₸
    pub amount: f64,

    /// Ledger description
    #[arg(short, long, default_value = "Manual deposit")]
    pub description: String,

    /// External payment reference
    #[arg(short, long)]
    pub reference: Option<String>,

    /// Path to configuration file
    #[arg(short, long, default_value = "aigate.toml")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct AccountsShowArgs {
    /// Account ID
    pub account_id: i64,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "aigate.toml")]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Initialize a new configuration file
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "aigate.toml")]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}
