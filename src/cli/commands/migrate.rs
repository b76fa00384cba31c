use anyhow::Context;
use serde_json::json;

use crate::cli::output::output_success;
use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::database::DatabaseManager;

pub async fn handle(config: &AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    let url = config
        .database
        .url
        .as_deref()
        .context("DATABASE_URL must be set to run migrations")?;
    let target = DatabaseManager::redacted_url(url)?;

    let pool = DatabaseManager::connect(&config.database)
        .await
        .with_context(|| format!("failed to connect to {}", target))?;
    DatabaseManager::migrate(&pool).await?;

    output_success(
        output_format,
        &format!("Migrations applied to {}", target),
        Some(json!({ "database": target })),
    )
}
