use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::ImpersonationEvent;

/// One start/end/expiry event of an impersonation session. All events of a
/// session share `session_id`; at most one closing event exists per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpersonationRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub event: ImpersonationEvent,
    pub operator_id: Uuid,
    pub operator_email: String,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub origin_ip: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Who closed a session and from where. `None` keeps the starting operator.
#[derive(Debug, Clone, Default)]
pub struct ClosedBy {
    pub operator_id: Option<Uuid>,
    pub operator_email: Option<String>,
    pub origin_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl ImpersonationRecord {
    /// The closing event for the session this `started` record opened
    pub fn closing(&self, event: ImpersonationEvent, by: ClosedBy, metadata: Value, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: self.session_id,
            event,
            operator_id: by.operator_id.unwrap_or(self.operator_id),
            operator_email: by.operator_email.unwrap_or_else(|| self.operator_email.clone()),
            tenant_id: self.tenant_id,
            user_id: self.user_id,
            origin_ip: by.origin_ip,
            user_agent: by.user_agent,
            expires_at: self.expires_at,
            metadata,
            created_at: now,
        }
    }
}
