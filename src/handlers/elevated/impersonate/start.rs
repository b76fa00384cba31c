// handlers/elevated/impersonate/start.rs - POST /admin/impersonate handler

use axum::extract::State;
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::{ApiResponse, ApiResult, JsonBody};
use crate::services::impersonation_service::{ImpersonationGrant, StartImpersonation};
use crate::services::Actor;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub reason: Option<String>,
}

/**
 * POST /admin/impersonate - Mint a delegated token for one tenant user
 *
 * The token carries the target's identity plus the acting operator and is
 * only accepted by the tenant-facing system (audience "tenant-app").
 * Refused for operators, inactive users, users of another tenant and
 * deleted tenants.
 */
pub async fn impersonate_start(
    State(state): State<AppState>,
    actor: Actor,
    JsonBody(body): JsonBody<StartRequest>,
) -> ApiResult<ImpersonationGrant> {
    let grant = state
        .impersonation
        .start(
            &actor,
            StartImpersonation {
                tenant_id: body.tenant_id,
                user_id: body.user_id,
                reason: body.reason,
            },
        )
        .await?;

    Ok(ApiResponse::created(grant))
}
