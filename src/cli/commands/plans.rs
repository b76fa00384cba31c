use crate::cli::output::output_collection;
use crate::cli::{connect, OutputFormat};
use crate::config::AppConfig;

pub async fn handle(config: &AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    let state = connect(config).await?;
    let plans = state.plans.list().await?;

    output_collection(
        output_format,
        "plans",
        &plans,
        &format!(
            "{:<14} {:>3} {:>6} {:>7} {:>6} {:>12} {}",
            "TIER", "VER", "USERS", "TABLES", "DAYS", "PRICE", "FEATURES"
        ),
        |plan| {
            let features: Vec<&str> = plan.features.iter().map(|f| f.as_str()).collect();
            let marker = if plan.active { "" } else { " (inactive)" };
            format!(
                "{:<14} {:>3} {:>6} {:>7} {:>6} {:>12} {}{}",
                plan.tier.as_str(),
                plan.version,
                plan.max_users,
                plan.max_tables,
                plan.duration_days,
                plan.annual_price,
                features.join(","),
                marker
            )
        },
    )
}
