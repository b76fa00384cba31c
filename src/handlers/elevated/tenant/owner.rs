// handlers/elevated/tenant/owner.rs - Owner admin support actions
//
// All four act on the tenant's owner admin only and are refused for deleted
// tenants.

use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::{ApiResponse, ApiResult, JsonBody};
use crate::services::tenant_service::{OwnerPasswordReset, OwnerSummary};
use crate::services::Actor;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEmailRequest {
    pub new_email: String,
}

#[derive(Debug, Deserialize)]
pub struct ToggleLockRequest {
    pub lock: bool,
}

#[derive(Debug, Serialize)]
pub struct LogoutAll {
    pub tenant_id: Uuid,
    pub sessions_invalidated: u64,
}

/// POST /admin/tenants/:id/reset-password - New temporary password, shown once
pub async fn owner_reset_password(
    State(state): State<AppState>,
    actor: Actor,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<OwnerPasswordReset> {
    let reset = state.tenants.reset_owner_password(&actor, tenant_id).await?;
    Ok(ApiResponse::success(reset))
}

/// POST /admin/tenants/:id/change-email
pub async fn owner_change_email(
    State(state): State<AppState>,
    actor: Actor,
    Path(tenant_id): Path<Uuid>,
    JsonBody(body): JsonBody<ChangeEmailRequest>,
) -> ApiResult<OwnerSummary> {
    let owner = state.tenants.change_owner_email(&actor, tenant_id, &body.new_email).await?;
    Ok(ApiResponse::success(owner))
}

/// POST /admin/tenants/:id/toggle-lock
pub async fn owner_toggle_lock(
    State(state): State<AppState>,
    actor: Actor,
    Path(tenant_id): Path<Uuid>,
    JsonBody(body): JsonBody<ToggleLockRequest>,
) -> ApiResult<OwnerSummary> {
    let owner = state.tenants.set_owner_lock(&actor, tenant_id, body.lock).await?;
    Ok(ApiResponse::success(owner))
}

/// POST /admin/tenants/:id/logout-all - Drop every live session of the tenant
pub async fn owner_logout_all(
    State(state): State<AppState>,
    actor: Actor,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<LogoutAll> {
    let sessions_invalidated = state.tenants.logout_all(&actor, tenant_id).await?;
    Ok(ApiResponse::success(LogoutAll {
        tenant_id,
        sessions_invalidated,
    }))
}
