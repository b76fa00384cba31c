// handlers/elevated/audit.rs - Platform-wide audit log handlers

use axum::extract::State;

use crate::database::models::AuditRecord;
use crate::handlers::LimitQuery;
use crate::middleware::{ApiResponse, ApiResult, QueryParams};
use crate::services::audit_service::AuditVerification;
use crate::state::AppState;

/// GET /admin/audit?limit= - Most recent audit records, newest first
pub async fn audit_recent(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<LimitQuery>,
) -> ApiResult<Vec<AuditRecord>> {
    let records = state.audit.recent(query.limit).await?;
    Ok(ApiResponse::success(records))
}

/// GET /admin/audit/verify?limit= - Recheck record signatures
pub async fn audit_verify(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<LimitQuery>,
) -> ApiResult<AuditVerification> {
    let verification = state.audit.verify(query.limit).await?;
    Ok(ApiResponse::success(verification))
}
