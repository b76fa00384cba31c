// handlers/elevated/license/list.rs - License queries

use axum::extract::{Path, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::database::models::LicenseFilter;
use crate::middleware::{ApiResponse, ApiResult, QueryParams};
use crate::services::license_service::LicenseView;
use crate::state::AppState;
use crate::types::{LicenseState, PlanTier};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseListQuery {
    pub state: Option<LicenseState>,
    pub plan: Option<PlanTier>,
    pub tenant_id: Option<Uuid>,
    pub limit: Option<i64>,
}

/// GET /admin/licenses?state=&plan=&tenantId=&limit=
pub async fn license_list(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<LicenseListQuery>,
) -> ApiResult<Vec<LicenseView>> {
    let filter = LicenseFilter {
        tenant_id: query.tenant_id,
        state: query.state,
        plan: query.plan,
        limit: query.limit,
    };
    let licenses = state.licenses.list(&filter).await?;
    Ok(ApiResponse::success(licenses))
}

/// GET /admin/licenses/:id
pub async fn license_show(State(state): State<AppState>, Path(license_id): Path<Uuid>) -> ApiResult<LicenseView> {
    let license = state.licenses.find(license_id).await?;
    Ok(ApiResponse::success(license))
}
