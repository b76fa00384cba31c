// handlers/elevated/tenant/show.rs - GET /admin/tenants/:id handler

use axum::extract::{Path, State};
use uuid::Uuid;

use crate::middleware::{ApiResponse, ApiResult};
use crate::services::tenant_service::TenantDetail;
use crate::state::AppState;

/// Profile, current license, recent licenses, owner, metrics and health alerts.
/// Deleted tenants answer 404 here.
pub async fn tenant_show(State(state): State<AppState>, Path(tenant_id): Path<Uuid>) -> ApiResult<TenantDetail> {
    let detail = state.tenants.detail(tenant_id).await?;
    Ok(ApiResponse::success(detail))
}
