// handlers/elevated/tenant/status.rs - PATCH /admin/tenants/:id/status handler

use axum::extract::{Path, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::database::models::Tenant;
use crate::middleware::{ApiResponse, ApiResult, JsonBody};
use crate::services::Actor;
use crate::state::AppState;
use crate::types::TenantStatus;

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: TenantStatus,
}

/// Suspend or reactivate a tenant. `deleted` is only reachable through delete.
pub async fn tenant_status(
    State(state): State<AppState>,
    actor: Actor,
    Path(tenant_id): Path<Uuid>,
    JsonBody(body): JsonBody<StatusRequest>,
) -> ApiResult<Tenant> {
    let tenant = state.tenants.set_status(&actor, tenant_id, body.status).await?;
    Ok(ApiResponse::success(tenant))
}
