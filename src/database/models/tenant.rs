use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{plan_label_serde, DeleteReason, PlanTier, TenantStatus};

/// A customer organization. Never physically removed; deletion is a timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    #[serde(with = "plan_label_serde")]
    pub plan: Option<PlanTier>,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
    pub delete_reason: Option<DeleteReason>,
    pub delete_detail: Option<String>,
}

impl Tenant {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Columns written by a soft delete
#[derive(Debug, Clone)]
pub struct TenantDeletion {
    pub deleted_by: Uuid,
    pub reason: DeleteReason,
    pub detail: Option<String>,
    pub deleted_at: DateTime<Utc>,
}

/// Listing filter. `deleted` selects between the live listing and its complement;
/// the two never overlap.
#[derive(Debug, Clone, Default)]
pub struct TenantFilter {
    pub status: Option<TenantStatus>,
    pub deleted: bool,
}
