// handlers/elevated/tenant/delete.rs - POST /admin/tenants/:id/delete handler
// Guarded soft delete with cascade

use axum::extract::{Path, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::{ApiResponse, ApiResult, JsonBody};
use crate::services::tenant_service::{DeleteTenant, DeletionSummary};
use crate::services::Actor;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTenantRequest {
    pub reason: String,
    pub detail: Option<String>,
    pub confirm_text: String,
    pub operator_password: String,
}

/**
 * POST /admin/tenants/:id/delete - Soft delete a tenant
 *
 * Guards, all checked before the first write:
 * - reason is a known code; `other` needs a detail of 10+ characters
 * - operatorPassword re-verifies against the calling operator's hash
 * - the tenant exists and is not already deleted
 * - confirmText is exactly "DELETE " followed by the tenant name
 *
 * On success the tenant is marked deleted, its users deactivated, its
 * sessions removed and any open license cancelled, all in one transaction.
 * A failed attempt is still written to the audit log.
 */
pub async fn tenant_delete(
    State(state): State<AppState>,
    actor: Actor,
    Path(tenant_id): Path<Uuid>,
    JsonBody(body): JsonBody<DeleteTenantRequest>,
) -> ApiResult<DeletionSummary> {
    let summary = state
        .tenants
        .delete(
            &actor,
            tenant_id,
            DeleteTenant {
                reason: body.reason,
                detail: body.detail,
                confirm_text: body.confirm_text,
                operator_password: body.operator_password,
            },
        )
        .await?;

    Ok(ApiResponse::success(summary))
}
