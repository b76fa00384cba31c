// handlers/elevated/impersonate/sessions.rs - Impersonation history and revocation

use axum::extract::{Path, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::database::models::ImpersonationRecord;
use crate::middleware::{ApiResponse, ApiResult, QueryParams};
use crate::services::impersonation_service::SessionClosed;
use crate::services::Actor;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub tenant_id: Option<Uuid>,
    pub limit: Option<i64>,
}

/// GET /admin/impersonations?tenantId=&limit=
pub async fn impersonation_history(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<HistoryQuery>,
) -> ApiResult<Vec<ImpersonationRecord>> {
    let events = state.impersonation.history(query.tenant_id, query.limit).await?;
    Ok(ApiResponse::success(events))
}

/// POST /admin/impersonations/:session_id/revoke - Close a session early
pub async fn impersonation_revoke(
    State(state): State<AppState>,
    actor: Actor,
    Path(session_id): Path<Uuid>,
) -> ApiResult<SessionClosed> {
    let closed = state.impersonation.revoke(&actor, session_id).await?;
    Ok(ApiResponse::success(closed))
}
