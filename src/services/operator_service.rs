use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::audit_service::{Actor, AuditService};
use super::error::ServiceError;
use super::tenant_service::normalize_email;
use crate::auth::password::{
    generate_temporary_password, hash_password, verify_against_dummy, verify_password, MIN_PASSWORD_LENGTH,
};
use crate::auth::{TokenError, TokenService};
use crate::clock::Clock;
use crate::database::models::{Tenant, User};
use crate::database::{DatabaseError, Store, StoreTx};
use crate::types::{AuditAction, TenantStatus, SYSTEM_TENANT_ID};

/// The authenticated operator behind a gateway request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorContext {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperatorProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for OperatorProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub operator: OperatorProfile,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedOperator {
    pub operator: OperatorProfile,
    /// Present only when the password was generated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary_password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewOperator {
    pub name: String,
    pub email: String,
    pub password: Option<String>,
}

/// Operator accounts: login, gateway resolution and bootstrap
pub struct OperatorService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    tokens: Arc<TokenService>,
    audit: Arc<AuditService>,
    bcrypt_cost: u32,
    allow_setup: bool,
}

impl OperatorService {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        tokens: Arc<TokenService>,
        audit: Arc<AuditService>,
        bcrypt_cost: u32,
        allow_setup: bool,
    ) -> Self {
        Self {
            store,
            clock,
            tokens,
            audit,
            bcrypt_cost,
            allow_setup,
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResult, ServiceError> {
        let email = email.trim().to_lowercase();
        let account = {
            let mut tx = self.store.begin().await?;
            tx.find_user_by_email(&email).await?
        };

        let Some(operator) = account.filter(|u| u.is_operator) else {
            verify_against_dummy(password).await?;
            warn!("Operator login refused for unknown account");
            return Err(ServiceError::InvalidCredentials);
        };

        if !verify_password(password, &operator.password_hash).await? {
            warn!("Operator login refused for {}: wrong password", operator.email);
            return Err(ServiceError::InvalidCredentials);
        }
        if !operator.active || operator.locked {
            warn!("Operator login refused for {}: account disabled", operator.email);
            return Err(ServiceError::Forbidden("Operator account is disabled".to_string()));
        }

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        tx.touch_last_login(operator.id, now).await?;
        tx.commit().await?;

        let issued = self.tokens.issue_operator(operator.id, &operator.email)?;
        info!("Operator {} logged in", operator.email);

        let mut profile = OperatorProfile::from(&operator);
        profile.last_login_at = Some(now);
        Ok(LoginResult {
            token: issued.token,
            expires_at: issued.expires_at,
            operator: profile,
        })
    }

    /// Resolves a bearer token to an active operator. Missing, malformed or
    /// expired tokens are unauthorized; valid credentials of the wrong kind
    /// or subject are forbidden.
    pub async fn resolve(&self, token: &str) -> Result<OperatorContext, ServiceError> {
        let claims = self.tokens.verify_operator(token).map_err(|e| match e {
            TokenError::WrongKind | TokenError::AudienceMismatch => {
                ServiceError::Forbidden("Operator credentials required".to_string())
            }
            TokenError::Expired => ServiceError::Unauthorized("Token has expired".to_string()),
            TokenError::Invalid(_) => ServiceError::Unauthorized("Invalid token".to_string()),
        })?;

        let mut tx = self.store.begin().await?;
        let user = tx.find_user(claims.sub).await?;
        match user {
            Some(u) if u.is_operator && u.active && !u.locked => Ok(OperatorContext {
                id: u.id,
                email: u.email,
                name: u.name,
            }),
            _ => Err(ServiceError::Forbidden("Operator access required".to_string())),
        }
    }

    pub async fn profile(&self, operator_id: Uuid) -> Result<OperatorProfile, ServiceError> {
        let mut tx = self.store.begin().await?;
        let user = tx
            .find_user(operator_id)
            .await?
            .filter(|u| u.is_operator)
            .ok_or(ServiceError::UserNotFound)?;
        Ok(OperatorProfile::from(&user))
    }

    /// First-operator bootstrap over HTTP. Refused once any operator exists.
    pub async fn setup(&self, actor: &Actor, request: NewOperator) -> Result<CreatedOperator, ServiceError> {
        if !self.allow_setup {
            return Err(ServiceError::Forbidden("Operator setup is disabled".to_string()));
        }
        if request.password.is_none() {
            return Err(ServiceError::validation("password", "A password is required"));
        }
        self.create_inner(actor, request, true).await
    }

    /// Creates an operator in the platform tenant, generating a password when none is given
    pub async fn create_operator(&self, actor: &Actor, request: NewOperator) -> Result<CreatedOperator, ServiceError> {
        self.create_inner(actor, request, false).await
    }

    async fn create_inner(
        &self,
        actor: &Actor,
        request: NewOperator,
        bootstrap: bool,
    ) -> Result<CreatedOperator, ServiceError> {
        let name = request.name.trim().to_string();
        if name.chars().count() < 2 {
            return Err(ServiceError::validation("name", "Name must be at least 2 characters"));
        }
        let email = normalize_email("email", &request.email)?;
        if let Some(password) = &request.password {
            if password.chars().count() < MIN_PASSWORD_LENGTH {
                return Err(ServiceError::validation(
                    "password",
                    format!("Password must be at least {} characters", MIN_PASSWORD_LENGTH),
                ));
            }
        }

        let temporary_password = request.password.is_none().then(generate_temporary_password);
        let password = request.password.as_deref().or(temporary_password.as_deref()).unwrap_or_default();
        let password_hash = hash_password(password, self.bcrypt_cost).await?;

        let mut tx = self.store.begin().await?;
        if bootstrap && tx.any_operator_exists().await? {
            return Err(ServiceError::Forbidden("Setup has already been completed".to_string()));
        }
        if tx.find_user_by_email(&email).await?.is_some() {
            return Err(ServiceError::DuplicateEmail(email));
        }

        let now = self.clock.now();
        ensure_system_tenant(tx.as_mut(), now).await?;

        let operator = User {
            id: Uuid::new_v4(),
            tenant_id: SYSTEM_TENANT_ID,
            role_id: None,
            name,
            username: email.clone(),
            email: email.clone(),
            password_hash,
            active: true,
            locked: false,
            is_operator: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        tx.insert_user(&operator).await.map_err(|e| match e {
            DatabaseError::UniqueViolation(_) => ServiceError::DuplicateEmail(email.clone()),
            other => other.into(),
        })?;

        self.audit
            .record(
                tx.as_mut(),
                actor,
                AuditAction::OperatorCreated,
                None,
                Some(operator.id),
                json!({ "email": operator.email, "bootstrap": bootstrap }),
            )
            .await?;
        tx.commit().await?;

        info!("{} created operator {}", actor.label(), operator.email);
        Ok(CreatedOperator {
            operator: OperatorProfile::from(&operator),
            temporary_password,
        })
    }
}

/// The platform tenant is seeded by the migration; recreate it if it went missing.
async fn ensure_system_tenant(tx: &mut dyn StoreTx, now: DateTime<Utc>) -> Result<(), ServiceError> {
    if tx.find_tenant(SYSTEM_TENANT_ID).await?.is_some() {
        return Ok(());
    }
    tx.insert_tenant(&Tenant {
        id: SYSTEM_TENANT_ID,
        name: "Platform".to_string(),
        slug: "system".to_string(),
        email: None,
        phone: None,
        address: None,
        plan: None,
        status: TenantStatus::Active,
        created_at: now,
        updated_at: now,
        deleted_at: None,
        deleted_by: None,
        delete_reason: None,
        delete_detail: None,
    })
    .await?;
    Ok(())
}
