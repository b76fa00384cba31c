// handlers/public/login.rs - POST /admin/login handler

use axum::extract::State;
use serde::Deserialize;

use crate::middleware::{ApiResponse, ApiResult, JsonBody};
use crate::services::operator_service::LoginResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /admin/login - Exchange operator credentials for an operator token
///
/// Unknown email and wrong password are indistinguishable (401); a disabled
/// operator with the right password gets 403.
pub async fn login(State(state): State<AppState>, JsonBody(body): JsonBody<LoginRequest>) -> ApiResult<LoginResult> {
    let result = state.operators.login(&body.email, &body.password).await?;
    Ok(ApiResponse::success(result))
}
