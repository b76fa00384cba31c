// handlers/public/setup.rs - POST /admin/setup handler

use axum::extract::State;
use serde::Deserialize;

use crate::middleware::{ApiResponse, ApiResult, JsonBody};
use crate::services::operator_service::{CreatedOperator, NewOperator};
use crate::services::{Actor, RequestOrigin};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// POST /admin/setup - Create the first operator account
///
/// Refused with 403 once any operator exists, or when disabled by configuration.
pub async fn setup(
    State(state): State<AppState>,
    origin: RequestOrigin,
    JsonBody(body): JsonBody<SetupRequest>,
) -> ApiResult<CreatedOperator> {
    let actor = Actor {
        operator_id: None,
        operator_email: None,
        origin,
    };
    let created = state
        .operators
        .setup(
            &actor,
            NewOperator {
                name: body.name,
                email: body.email,
                password: Some(body.password),
            },
        )
        .await?;
    Ok(ApiResponse::created(created))
}
