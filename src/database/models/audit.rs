use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::AuditAction;

/// Immutable record of one privileged action. `digest` is an HMAC over the
/// other fields so edits made outside the application are detectable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub action: AuditAction,
    pub operator_id: Option<Uuid>,
    pub operator_email: Option<String>,
    pub tenant_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub details: Value,
    pub origin_ip: Option<String>,
    pub user_agent: Option<String>,
    pub digest: String,
    pub created_at: DateTime<Utc>,
}
