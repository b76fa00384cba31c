// handlers/public/impersonate_end.rs - POST /admin/impersonate/end handler
//
// Called by the tenant-facing system with the impersonation token as the
// bearer. Operator tokens are not accepted here.

use axum::{extract::State, http::HeaderMap};

use crate::error::ApiError;
use crate::middleware::{bearer_token, ApiResponse, ApiResult};
use crate::services::impersonation_service::SessionClosed;
use crate::services::RequestOrigin;
use crate::state::AppState;

pub async fn impersonate_end(
    State(state): State<AppState>,
    headers: HeaderMap,
    origin: RequestOrigin,
) -> ApiResult<SessionClosed> {
    let token = bearer_token(&headers).map_err(ApiError::unauthorized)?;
    let closed = state.impersonation.end(token, origin).await?;
    Ok(ApiResponse::success(closed))
}
