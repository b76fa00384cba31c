// handlers/elevated/tenant/create.rs - POST /admin/tenants handler
// Onboard a tenant together with its owner admin account

use axum::extract::State;
use serde::Deserialize;

use crate::middleware::{ApiResponse, ApiResult, JsonBody};
use crate::services::tenant_service::{CreateTenant, CreatedTenant};
use crate::services::Actor;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTenantRequest {
    pub name: String,
    pub owner_name: String,
    pub owner_email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/**
 * POST /admin/tenants - Create a tenant and its owner admin
 *
 * In one transaction: the tenant (status active, plan none), an
 * Administrator role holding every system permission, the owner user with
 * a generated password, and the default product categories.
 *
 * Expected Input:
 * ```json
 * {
 *   "name": "Acme Bistro",          // Required: at least 3 characters
 *   "ownerName": "Ana Gomez",       // Required: at least 2 characters
 *   "ownerEmail": "ana@acme.test",  // Required: globally unique
 *   "phone": "+57 300 000 0000",    // Optional
 *   "address": "Calle 1 #2-3"       // Optional
 * }
 * ```
 *
 * The owner's temporary password appears in this response only.
 */
pub async fn tenant_create(
    State(state): State<AppState>,
    actor: Actor,
    JsonBody(body): JsonBody<CreateTenantRequest>,
) -> ApiResult<CreatedTenant> {
    let created = state
        .tenants
        .create(
            &actor,
            CreateTenant {
                name: body.name,
                owner_name: body.owner_name,
                owner_email: body.owner_email,
                phone: body.phone,
                address: body.address,
            },
        )
        .await?;

    Ok(ApiResponse::created(created))
}
