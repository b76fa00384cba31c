// handlers/elevated/dashboard.rs - GET /admin/dashboard handler

use axum::extract::State;

use crate::middleware::{ApiResponse, ApiResult};
use crate::services::tenant_service::Dashboard;
use crate::state::AppState;

/// Tenant, license and user counts across the platform, plus the number of
/// licenses ending inside the configured expiring-soon window.
pub async fn dashboard(State(state): State<AppState>) -> ApiResult<Dashboard> {
    let dashboard = state.tenants.dashboard().await?;
    Ok(ApiResponse::success(dashboard))
}
