// handlers/elevated/license/transition.rs - Extend, pause and resume
//
// Illegal transitions (extending a paused or terminal license, pausing a
// license that is not entitled, resuming one that is not paused) answer 409.

use axum::extract::{Path, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::{ApiResponse, ApiResult, JsonBody};
use crate::services::license_service::{LicenseView, ResumeOutcome};
use crate::services::Actor;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExtendRequest {
    pub days: i64,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PauseRequest {
    pub reason: String,
}

/// POST /admin/licenses/:id/extend - Push the end date out by `days`
pub async fn license_extend(
    State(state): State<AppState>,
    actor: Actor,
    Path(license_id): Path<Uuid>,
    JsonBody(body): JsonBody<ExtendRequest>,
) -> ApiResult<LicenseView> {
    let license = state
        .licenses
        .extend(&actor, license_id, body.days, body.reason)
        .await?;
    Ok(ApiResponse::success(license))
}

/// POST /admin/licenses/:id/pause - Stop the clock
pub async fn license_pause(
    State(state): State<AppState>,
    actor: Actor,
    Path(license_id): Path<Uuid>,
    JsonBody(body): JsonBody<PauseRequest>,
) -> ApiResult<LicenseView> {
    let license = state.licenses.pause(&actor, license_id, body.reason).await?;
    Ok(ApiResponse::success(license))
}

/// POST /admin/licenses/:id/resume - Credit the paused days back onto the end date
pub async fn license_resume(
    State(state): State<AppState>,
    actor: Actor,
    Path(license_id): Path<Uuid>,
) -> ApiResult<ResumeOutcome> {
    let outcome = state.licenses.resume(&actor, license_id).await?;
    Ok(ApiResponse::success(outcome))
}
