// handlers/elevated/plan/catalog.rs - Versioned plan catalog

use axum::extract::{Path, State};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::database::models::PlanDefinition;
use crate::middleware::{ApiResponse, ApiResult, JsonBody};
use crate::services::plan_service::UpdatePlan;
use crate::services::Actor;
use crate::state::AppState;
use crate::types::PlanTier;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlanRequest {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub max_users: Option<i32>,
    pub max_tables: Option<i32>,
    pub duration_days: Option<i32>,
    pub annual_price: Option<Decimal>,
    pub active: Option<bool>,
}

/// GET /admin/plans - Current definition of every tier
pub async fn plan_list(State(state): State<AppState>) -> ApiResult<Vec<PlanDefinition>> {
    let plans = state.plans.list().await?;
    Ok(ApiResponse::success(plans))
}

/// PUT /admin/plans/:tier - Publish a new version of one tier.
/// Existing licenses keep the caps they were issued with.
pub async fn plan_update(
    State(state): State<AppState>,
    actor: Actor,
    Path(tier): Path<PlanTier>,
    JsonBody(body): JsonBody<UpdatePlanRequest>,
) -> ApiResult<PlanDefinition> {
    let changes = UpdatePlan {
        display_name: body.display_name,
        description: body.description,
        max_users: body.max_users,
        max_tables: body.max_tables,
        duration_days: body.duration_days,
        annual_price: body.annual_price,
        active: body.active,
    };
    let plan = state.plans.update(&actor, tier, changes).await?;
    Ok(ApiResponse::success(plan))
}
