//! Impersonation broker.
//!
//! Mints short-lived `tenant-app` tokens that let an operator act as one
//! tenant user, and keeps the start/close history of each session. A session
//! is closed at most once: by the tenant-facing system ending it, by an
//! operator revoking it, or by the sweep once it has lapsed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::audit_service::{Actor, AuditService, RequestOrigin};
use super::error::ServiceError;
use crate::auth::{ActingOperator, ImpersonationClaims, TokenService};
use crate::clock::Clock;
use crate::database::models::ImpersonationRecord;
use crate::database::{Store, StoreTx};
use crate::types::{ImpersonationEvent, SYSTEM_TENANT_ID};

#[derive(Debug, Clone)]
pub struct StartImpersonation {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImpersonatedUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Delegated credential handed to the tenant-facing system
#[derive(Debug, Clone, Serialize)]
pub struct ImpersonationGrant {
    pub session_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub tenant_id: Uuid,
    pub user: ImpersonatedUser,
    pub acting_operator: ActingOperator,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionClosed {
    pub session_id: Uuid,
    /// False when the session had already been closed
    pub ended: bool,
}

pub struct ImpersonationBroker {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    tokens: Arc<TokenService>,
    audit: Arc<AuditService>,
}

impl ImpersonationBroker {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, tokens: Arc<TokenService>, audit: Arc<AuditService>) -> Self {
        Self {
            store,
            clock,
            tokens,
            audit,
        }
    }

    pub async fn start(&self, actor: &Actor, request: StartImpersonation) -> Result<ImpersonationGrant, ServiceError> {
        let (Some(operator_id), Some(operator_email)) = (actor.operator_id, actor.operator_email.clone()) else {
            return Err(ServiceError::Forbidden("Only an operator can impersonate".to_string()));
        };

        let mut tx = self.store.begin().await?;

        let tenant = tx
            .lock_tenant(request.tenant_id)
            .await?
            .filter(|t| t.id != SYSTEM_TENANT_ID)
            .ok_or(ServiceError::TenantNotFound)?;
        if tenant.is_deleted() {
            return Err(ServiceError::Forbidden("Tenant has been deleted".to_string()));
        }

        let user = tx.find_user(request.user_id).await?.ok_or(ServiceError::UserNotFound)?;
        if user.tenant_id != tenant.id {
            return Err(ServiceError::Forbidden("User does not belong to this tenant".to_string()));
        }
        if user.is_operator {
            return Err(ServiceError::Forbidden("Operators cannot be impersonated".to_string()));
        }
        if !user.active {
            return Err(ServiceError::Forbidden("User is inactive".to_string()));
        }

        let license_state = tx.license_history(tenant.id, 1).await?.first().map(|l| l.state);

        let session_id = Uuid::new_v4();
        let acting_operator = ActingOperator {
            id: operator_id,
            email: operator_email.clone(),
        };
        let issued =
            self.tokens
                .issue_impersonation(session_id, user.id, tenant.id, &user.email, acting_operator.clone())?;

        let record = ImpersonationRecord {
            id: Uuid::new_v4(),
            session_id,
            event: ImpersonationEvent::Started,
            operator_id,
            operator_email,
            tenant_id: tenant.id,
            user_id: user.id,
            origin_ip: actor.origin.ip.clone(),
            user_agent: actor.origin.user_agent.clone(),
            expires_at: issued.expires_at,
            metadata: json!({
                "tenant_name": tenant.name,
                "user_email": user.email,
                "user_name": user.name,
                "license_state": license_state,
                "reason": request.reason,
            }),
            created_at: self.clock.now(),
        };
        tx.insert_impersonation(&record).await?;
        tx.commit().await?;

        info!(
            "{} started impersonating {} in tenant {} (session {})",
            actor.label(),
            user.email,
            tenant.id,
            session_id
        );
        Ok(ImpersonationGrant {
            session_id,
            token: issued.token,
            expires_at: issued.expires_at,
            tenant_id: tenant.id,
            user: ImpersonatedUser {
                id: user.id,
                name: user.name,
                email: user.email,
            },
            acting_operator,
        })
    }

    /// Verifies an impersonation token for the consuming system: signature,
    /// audience, kind and expiry, that the session has not been closed, and
    /// that the tenant is still live and the user still active.
    pub async fn verify(&self, token: &str) -> Result<ImpersonationClaims, ServiceError> {
        let claims = self
            .tokens
            .verify_impersonation(token)
            .map_err(|e| ServiceError::Unauthorized(e.to_string()))?;

        let mut tx = self.store.begin().await?;
        let events = tx.impersonation_events(claims.sid).await?;
        if events.is_empty() {
            return Err(ServiceError::SessionNotFound);
        }
        if events.iter().any(|e| e.event.closes_session()) {
            return Err(ServiceError::Unauthorized("Impersonation session has ended".to_string()));
        }

        let tenant_live = tx
            .find_tenant(claims.tenant_id)
            .await?
            .is_some_and(|t| !t.is_deleted());
        if !tenant_live {
            return Err(ServiceError::Unauthorized("Tenant is no longer available".to_string()));
        }
        let user_active = tx
            .find_user(claims.sub)
            .await?
            .is_some_and(|u| u.active && u.tenant_id == claims.tenant_id);
        if !user_active {
            return Err(ServiceError::Unauthorized("Impersonated user is no longer active".to_string()));
        }
        Ok(claims)
    }

    /// Ends the session named by the token itself
    pub async fn end(&self, token: &str, origin: RequestOrigin) -> Result<SessionClosed, ServiceError> {
        let claims = self
            .tokens
            .verify_impersonation(token)
            .map_err(|e| ServiceError::Unauthorized(e.to_string()))?;

        let actor = Actor::operator(claims.acting_operator.id, claims.acting_operator.email.clone(), origin);
        let closed = self
            .close(&actor, claims.sid, ImpersonationEvent::Ended, json!({ "closed_by": "token_holder" }))
            .await?;
        if closed.ended {
            info!("Impersonation session {} ended by its holder", claims.sid);
        }
        Ok(closed)
    }

    /// Closes a session early on behalf of an operator
    pub async fn revoke(&self, actor: &Actor, session_id: Uuid) -> Result<SessionClosed, ServiceError> {
        if actor.operator_id.is_none() {
            return Err(ServiceError::Forbidden("Only an operator can revoke a session".to_string()));
        }
        let closed = self
            .close(
                actor,
                session_id,
                ImpersonationEvent::Ended,
                json!({ "closed_by": "operator", "revoked": true }),
            )
            .await?;
        if closed.ended {
            info!("{} revoked impersonation session {}", actor.label(), session_id);
        }
        Ok(closed)
    }

    async fn close(
        &self,
        actor: &Actor,
        session_id: Uuid,
        event: ImpersonationEvent,
        metadata: Value,
    ) -> Result<SessionClosed, ServiceError> {
        let mut tx = self.store.begin().await?;
        let started = tx
            .impersonation_events(session_id)
            .await?
            .into_iter()
            .find(|e| e.event == ImpersonationEvent::Started)
            .ok_or(ServiceError::SessionNotFound)?;

        let record = self.closing_record(&started, event, actor, metadata);
        let ended = tx.insert_impersonation(&record).await?;
        tx.commit().await?;
        Ok(SessionClosed { session_id, ended })
    }

    fn closing_record(
        &self,
        started: &ImpersonationRecord,
        event: ImpersonationEvent,
        actor: &Actor,
        metadata: Value,
    ) -> ImpersonationRecord {
        started.closing(event, actor.closed_by(), metadata, self.clock.now())
    }

    /// Writes an `expired` record for every open session past its expiry
    pub async fn close_lapsed(&self) -> Result<Vec<Uuid>, ServiceError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let lapsed = tx.lapsed_impersonations(now).await?;

        let system = Actor {
            operator_id: None,
            operator_email: None,
            origin: RequestOrigin::default(),
        };
        let mut closed = Vec::with_capacity(lapsed.len());
        for started in &lapsed {
            let record = self.closing_record(started, ImpersonationEvent::Expired, &system, json!({ "closed_by": "sweep" }));
            if insert_closing(tx.as_mut(), &record).await? {
                closed.push(started.session_id);
            }
        }
        tx.commit().await?;

        if !closed.is_empty() {
            info!("Closed {} lapsed impersonation session(s)", closed.len());
        }
        Ok(closed)
    }

    pub async fn history(&self, tenant_id: Option<Uuid>, limit: Option<i64>) -> Result<Vec<ImpersonationRecord>, ServiceError> {
        let limit = self.audit.clamp_limit(limit);
        let mut tx = self.store.begin().await?;
        Ok(tx.list_impersonations(tenant_id, limit).await?)
    }
}

async fn insert_closing(tx: &mut dyn StoreTx, record: &ImpersonationRecord) -> Result<bool, ServiceError> {
    let inserted = tx.insert_impersonation(record).await?;
    if !inserted {
        warn!("Impersonation session {} was already closed", record.session_id);
    }
    Ok(inserted)
}
