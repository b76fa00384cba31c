// handlers/elevated/tenant/plan.rs - POST /admin/tenants/:id/change-plan handler

use axum::extract::{Path, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::{ApiResponse, ApiResult, JsonBody};
use crate::services::license_service::PlanChange;
use crate::services::Actor;
use crate::state::AppState;
use crate::types::PlanTier;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePlanRequest {
    pub new_plan: PlanTier,
    pub reason: Option<String>,
}

/// Move the tenant to another plan. The open license, if any, takes the new
/// plan's caps and features; its state and dates do not change.
pub async fn tenant_change_plan(
    State(state): State<AppState>,
    actor: Actor,
    Path(tenant_id): Path<Uuid>,
    JsonBody(body): JsonBody<ChangePlanRequest>,
) -> ApiResult<PlanChange> {
    let change = state
        .licenses
        .change_plan(&actor, tenant_id, body.new_plan, body.reason)
        .await?;
    Ok(ApiResponse::success(change))
}
