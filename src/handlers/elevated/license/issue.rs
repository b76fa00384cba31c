// handlers/elevated/license/issue.rs - POST /admin/licenses handler

use axum::extract::State;
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::{ApiResponse, ApiResult, JsonBody};
use crate::services::license_service::{IssueLicense, LicenseView};
use crate::services::Actor;
use crate::state::AppState;
use crate::types::PlanTier;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueLicenseRequest {
    pub tenant_id: Uuid,
    pub plan: PlanTier,
    pub duration_days: Option<i64>,
    #[serde(default)]
    pub is_trial: bool,
    pub max_users: Option<i32>,
    pub max_tables: Option<i32>,
    pub notes: Option<String>,
}

/**
 * POST /admin/licenses - Issue a license to a tenant
 *
 * Any open license the tenant holds is superseded in the same transaction.
 * Caps and features default to the plan's current definition; durationDays
 * defaults to the plan duration.
 */
pub async fn license_issue(
    State(state): State<AppState>,
    actor: Actor,
    JsonBody(body): JsonBody<IssueLicenseRequest>,
) -> ApiResult<LicenseView> {
    let license = state
        .licenses
        .issue(
            &actor,
            IssueLicense {
                tenant_id: body.tenant_id,
                plan: body.plan,
                duration_days: body.duration_days,
                is_trial: body.is_trial,
                max_users: body.max_users,
                max_tables: body.max_tables,
                notes: body.notes,
            },
        )
        .await?;

    Ok(ApiResponse::created(license))
}
