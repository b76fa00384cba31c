use clap::Subcommand;
use serde_json::json;

use crate::cli::output::output_success;
use crate::cli::{connect, OutputFormat};
use crate::config::AppConfig;
use crate::services::operator_service::NewOperator;
use crate::services::Actor;

#[derive(Subcommand)]
pub enum OperatorCommands {
    #[command(about = "Create an operator account")]
    Create {
        #[arg(long, help = "Display name")]
        name: String,
        #[arg(long, help = "Login email")]
        email: String,
        #[arg(long, help = "Password (a temporary one is generated when omitted)")]
        password: Option<String>,
    },
}

pub async fn handle(cmd: OperatorCommands, config: &AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        OperatorCommands::Create { name, email, password } => {
            let state = connect(config).await?;
            let created = state
                .operators
                .create_operator(&Actor::cli(), NewOperator { name, email, password })
                .await?;

            output_success(
                output_format,
                &format!("Created operator {} ({})", created.operator.email, created.operator.id),
                Some(json!({ "operator": created.operator })),
            )?;

            if let Some(temporary) = &created.temporary_password {
                match output_format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&json!({ "temporary_password": temporary }))?)
                    }
                    OutputFormat::Text => println!("  Temporary password (shown once): {}", temporary),
                }
            }
            Ok(())
        }
    }
}
