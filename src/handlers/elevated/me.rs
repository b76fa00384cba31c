// handlers/elevated/me.rs - Current operator profile and operator creation

use axum::{extract::State, Extension};
use serde::Deserialize;

use crate::middleware::{ApiResponse, ApiResult, JsonBody};
use crate::services::operator_service::{CreatedOperator, NewOperator, OperatorProfile};
use crate::services::{Actor, OperatorContext};
use crate::state::AppState;

/// GET /admin/me
pub async fn me(
    State(state): State<AppState>,
    Extension(operator): Extension<OperatorContext>,
) -> ApiResult<OperatorProfile> {
    let profile = state.operators.profile(operator.id).await?;
    Ok(ApiResponse::success(profile))
}

#[derive(Debug, Deserialize)]
pub struct CreateOperatorRequest {
    pub name: String,
    pub email: String,
    /// Omitted to have a temporary password generated and returned once
    pub password: Option<String>,
}

/// POST /admin/operators
pub async fn operator_create(
    State(state): State<AppState>,
    actor: Actor,
    JsonBody(body): JsonBody<CreateOperatorRequest>,
) -> ApiResult<CreatedOperator> {
    let created = state
        .operators
        .create_operator(
            &actor,
            NewOperator {
                name: body.name,
                email: body.email,
                password: body.password,
            },
        )
        .await?;
    Ok(ApiResponse::created(created))
}
