use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use super::error::ServiceError;
use crate::clock::Clock;
use crate::database::models::{AuditRecord, ClosedBy, ImpersonationRecord};
use crate::database::{Store, StoreTx};
use crate::types::AuditAction;

type HmacSha256 = Hmac<Sha256>;

/// Where a request came from, as recorded in audit and impersonation rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOrigin {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Who performed a privileged action
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    pub operator_id: Option<Uuid>,
    pub operator_email: Option<String>,
    pub origin: RequestOrigin,
}

impl Actor {
    pub fn operator(id: Uuid, email: impl Into<String>, origin: RequestOrigin) -> Self {
        Self {
            operator_id: Some(id),
            operator_email: Some(email.into()),
            origin,
        }
    }

    /// Name used in log lines
    pub fn label(&self) -> &str {
        self.operator_email.as_deref().unwrap_or("cpctl")
    }

    /// Attribution for an impersonation closing event
    pub fn closed_by(&self) -> ClosedBy {
        ClosedBy {
            operator_id: self.operator_id,
            operator_email: self.operator_email.clone(),
            origin_ip: self.origin.ip.clone(),
            user_agent: self.origin.user_agent.clone(),
        }
    }

    /// Actions taken from the command line, outside any operator session
    pub fn cli() -> Self {
        Self {
            operator_id: None,
            operator_email: None,
            origin: RequestOrigin {
                ip: None,
                user_agent: Some("cpctl".to_string()),
            },
        }
    }
}

/// HMAC-SHA256 over the canonical form of an audit record.
#[derive(Clone)]
pub struct AuditSigner {
    mac: HmacSha256,
}

impl AuditSigner {
    pub fn new(key: &[u8]) -> Result<Self, hmac::digest::InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(key)?,
        })
    }

    fn canonical(record: &AuditRecord) -> String {
        fn opt<T: ToString>(value: &Option<T>) -> String {
            value.as_ref().map(ToString::to_string).unwrap_or_default()
        }

        [
            record.id.to_string(),
            record.action.to_string(),
            opt(&record.operator_id),
            opt(&record.operator_email),
            opt(&record.tenant_id),
            opt(&record.user_id),
            record.details.to_string(),
            opt(&record.origin_ip),
            opt(&record.user_agent),
            record.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        ]
        .join("\n")
    }

    pub fn sign(&self, record: &AuditRecord) -> String {
        let mut mac = self.mac.clone();
        mac.update(Self::canonical(record).as_bytes());
        format!("{:x}", mac.finalize().into_bytes())
    }

    pub fn verify(&self, record: &AuditRecord) -> bool {
        self.sign(record) == record.digest
    }
}

/// One row of a tenant's merged trail
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum TrailEntry {
    Audit(AuditRecord),
    Impersonation(ImpersonationRecord),
}

impl TrailEntry {
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            TrailEntry::Audit(record) => record.created_at,
            TrailEntry::Impersonation(record) => record.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditVerification {
    pub checked: usize,
    pub tampered: Vec<Uuid>,
}

pub struct AuditService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    signer: AuditSigner,
    default_limit: i64,
    max_limit: i64,
}

impl AuditService {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        signer: AuditSigner,
        default_limit: i64,
        max_limit: i64,
    ) -> Self {
        Self {
            store,
            clock,
            signer,
            default_limit,
            max_limit,
        }
    }

    /// Page size bounded to `1..=max_limit`
    pub fn clamp_limit(&self, limit: Option<i64>) -> i64 {
        limit.unwrap_or(self.default_limit).clamp(1, self.max_limit)
    }

    /// Writes a signed record inside the caller's transaction, so it commits
    /// or rolls back together with the mutation it describes.
    pub async fn record(
        &self,
        tx: &mut dyn StoreTx,
        actor: &Actor,
        action: AuditAction,
        tenant_id: Option<Uuid>,
        user_id: Option<Uuid>,
        details: Value,
    ) -> Result<AuditRecord, ServiceError> {
        let mut record = AuditRecord {
            id: Uuid::new_v4(),
            action,
            operator_id: actor.operator_id,
            operator_email: actor.operator_email.clone(),
            tenant_id,
            user_id,
            details,
            origin_ip: actor.origin.ip.clone(),
            user_agent: actor.origin.user_agent.clone(),
            digest: String::new(),
            created_at: self.clock.now(),
        };
        record.digest = self.signer.sign(&record);

        tx.insert_audit(&record).await?;
        Ok(record)
    }

    /// Records a failed attempt in a transaction of its own. Best effort:
    /// a failure here is logged and the original error still reaches the caller.
    pub async fn record_failure(
        &self,
        actor: &Actor,
        action: AuditAction,
        tenant_id: Option<Uuid>,
        failure: &ServiceError,
        mut details: Value,
    ) {
        if let Value::Object(map) = &mut details {
            map.insert("error".into(), Value::String(failure.kind().to_string()));
            map.insert("message".into(), Value::String(failure.to_string()));
        }

        let result = async {
            let mut tx = self.store.begin().await?;
            self.record(tx.as_mut(), actor, action, tenant_id, None, details).await?;
            tx.commit().await?;
            Ok::<_, ServiceError>(())
        }
        .await;

        if let Err(e) = result {
            error!(
                "Could not record {} for tenant {:?}: {} (original failure: {})",
                action, tenant_id, e, failure
            );
        }
    }

    /// Audit and impersonation records of one tenant, newest first
    pub async fn tenant_trail(&self, tenant_id: Uuid, limit: Option<i64>) -> Result<Vec<TrailEntry>, ServiceError> {
        let limit = self.clamp_limit(limit);
        let mut tx = self.store.begin().await?;

        if tx.find_tenant(tenant_id).await?.is_none() {
            return Err(ServiceError::TenantNotFound);
        }

        let audits = tx.list_audit(Some(tenant_id), limit).await?;
        let impersonations = tx.list_impersonations(Some(tenant_id), limit).await?;

        let mut trail: Vec<TrailEntry> = audits
            .into_iter()
            .map(TrailEntry::Audit)
            .chain(impersonations.into_iter().map(TrailEntry::Impersonation))
            .collect();
        trail.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        trail.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(trail)
    }

    pub async fn recent(&self, limit: Option<i64>) -> Result<Vec<AuditRecord>, ServiceError> {
        let limit = self.clamp_limit(limit);
        let mut tx = self.store.begin().await?;
        Ok(tx.list_audit(None, limit).await?)
    }

    /// Recomputes digests of the most recent records
    pub async fn verify(&self, limit: Option<i64>) -> Result<AuditVerification, ServiceError> {
        let records = self.recent(limit).await?;
        let tampered: Vec<Uuid> = records
            .iter()
            .filter(|record| !self.signer.verify(record))
            .map(|record| record.id)
            .collect();

        if !tampered.is_empty() {
            warn!("{} audit record(s) failed digest verification", tampered.len());
        }
        Ok(AuditVerification {
            checked: records.len(),
            tampered,
        })
    }
}
