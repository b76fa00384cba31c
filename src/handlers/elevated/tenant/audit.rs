// handlers/elevated/tenant/audit.rs - GET /admin/tenants/:id/audit handler

use axum::extract::{Path, State};
use uuid::Uuid;

use crate::handlers::LimitQuery;
use crate::middleware::{ApiResponse, ApiResult, QueryParams};
use crate::services::audit_service::TrailEntry;
use crate::state::AppState;

/// Audit records and impersonation events of one tenant, merged newest first.
/// Works for deleted tenants too.
pub async fn tenant_audit(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    QueryParams(query): QueryParams<LimitQuery>,
) -> ApiResult<Vec<TrailEntry>> {
    let trail = state.audit.tenant_trail(tenant_id, query.limit).await?;
    Ok(ApiResponse::success(trail))
}
