pub mod commands;
pub mod output;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clock::SystemClock;
use crate::config::AppConfig;
use crate::state::{open_store, AppState};

#[derive(Parser)]
#[command(name = "cpctl")]
#[command(about = "Control plane operator CLI - migrations, operator accounts and maintenance")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Apply pending database migrations")]
    Migrate,

    #[command(about = "Operator account management")]
    Operator {
        #[command(subcommand)]
        cmd: commands::operator::OperatorCommands,
    },

    #[command(about = "Expire lapsed licenses and close lapsed impersonation sessions")]
    Sweep,

    #[command(about = "Print the current plan catalog")]
    Plans,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli, config: &AppConfig) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Migrate => commands::migrate::handle(config, output_format).await,
        Commands::Operator { cmd } => commands::operator::handle(cmd, config, output_format).await,
        Commands::Sweep => commands::sweep::handle(config, output_format).await,
        Commands::Plans => commands::plans::handle(config, output_format).await,
    }
}

/// Services wired the same way the server wires them
pub(crate) async fn connect(config: &AppConfig) -> anyhow::Result<AppState> {
    config.validate().context("invalid configuration")?;
    let store = open_store(config).await?;
    AppState::new(config, store, Arc::new(SystemClock))
}
