use serde_json::json;

use crate::cli::output::output_success;
use crate::cli::{connect, OutputFormat};
use crate::config::AppConfig;

pub async fn handle(config: &AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    let state = connect(config).await?;
    let report = state.sweep().await?;

    output_success(
        output_format,
        &format!(
            "Expired {} license(s), closed {} impersonation session(s)",
            report.licenses_expired, report.sessions_closed
        ),
        Some(json!({ "report": report })),
    )
}
