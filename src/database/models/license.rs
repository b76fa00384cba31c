use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{FeatureSet, LicenseState, PlanTier};

/// Time-bounded entitlement for one tenant. Rows are superseded or
/// cancelled, never deleted, so the table is the full history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub plan: PlanTier,
    pub state: LicenseState,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub paused_days: i32,
    pub max_users: i32,
    pub max_tables: i32,
    pub features: FeatureSet,
    pub notes: Option<String>,
    pub change_reason: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct LicenseFilter {
    pub tenant_id: Option<Uuid>,
    pub state: Option<LicenseState>,
    pub plan: Option<PlanTier>,
    pub limit: Option<i64>,
}

impl LicenseFilter {
    pub fn matches(&self, license: &License) -> bool {
        self.tenant_id.map_or(true, |id| license.tenant_id == id)
            && self.state.map_or(true, |s| license.state == s)
            && self.plan.map_or(true, |p| license.plan == p)
    }
}
