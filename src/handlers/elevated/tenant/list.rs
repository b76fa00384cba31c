// handlers/elevated/tenant/list.rs - Tenant listings

use axum::extract::State;
use serde::Deserialize;

use crate::database::models::Tenant;
use crate::middleware::{ApiResponse, ApiResult, QueryParams};
use crate::services::tenant_service::TenantSummary;
use crate::state::AppState;
use crate::types::TenantStatus;

#[derive(Debug, Default, Deserialize)]
pub struct TenantListQuery {
    pub status: Option<TenantStatus>,
}

/// GET /admin/tenants?status= - Live tenants with their license digest and user counts
pub async fn tenant_list(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<TenantListQuery>,
) -> ApiResult<Vec<TenantSummary>> {
    let tenants = state.tenants.list(query.status).await?;
    Ok(ApiResponse::success(tenants))
}

/// GET /admin/tenants-deleted - Soft-deleted tenants with reason and date
pub async fn tenant_list_deleted(State(state): State<AppState>) -> ApiResult<Vec<Tenant>> {
    let tenants = state.tenants.list_deleted().await?;
    Ok(ApiResponse::success(tenants))
}
