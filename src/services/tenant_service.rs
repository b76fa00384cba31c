use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::audit_service::{Actor, AuditService};
use super::error::ServiceError;
use super::license_state::days_remaining;
use super::license_service::LicenseView;
use crate::auth::password::{generate_temporary_password, hash_password, verify_password};
use crate::clock::Clock;
use crate::database::models::role::{ADMINISTRATOR_ROLE, DEFAULT_CATEGORIES};
use crate::database::models::{Category, License, Role, Tenant, TenantDeletion, TenantFilter, User, UserStats};
use crate::database::{DatabaseError, Store, StoreTx};
use crate::types::{
    AuditAction, DeleteReason, ImpersonationEvent, LicenseState, PlanTier, TenantStatus, SYSTEM_TENANT_ID,
};

const MIN_TENANT_NAME: usize = 3;
const MIN_OWNER_NAME: usize = 2;
const MIN_OTHER_DETAIL: usize = 10;
const RECENT_LICENSES: i64 = 10;

// Health alert thresholds, in days
const INACTIVE_WARNING_DAYS: i64 = 14;
const INACTIVE_DANGER_DAYS: i64 = 30;
const EXPIRING_WARNING_DAYS: i64 = 7;
const EXPIRING_DANGER_DAYS: i64 = 3;

#[derive(Debug, Clone)]
pub struct CreateTenant {
    pub name: String,
    pub owner_name: String,
    pub owner_email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Owner login details. The password is only ever returned here.
#[derive(Debug, Clone, Serialize)]
pub struct OwnerCredentials {
    pub user_id: Uuid,
    pub name: String,
    pub username: String,
    pub email: String,
    pub temporary_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedTenant {
    pub tenant: Tenant,
    pub owner: OwnerCredentials,
}

#[derive(Debug, Clone)]
pub struct DeleteTenant {
    pub reason: String,
    pub detail: Option<String>,
    pub confirm_text: String,
    pub operator_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletionSummary {
    pub tenant_id: Uuid,
    pub deleted_at: DateTime<Utc>,
    pub users_deactivated: u64,
    pub sessions_invalidated: u64,
    pub licenses_cancelled: u64,
    pub impersonations_closed: u64,
}

/// Compact license state shown in tenant listings
#[derive(Debug, Clone, Serialize)]
pub struct LicenseDigest {
    pub id: Uuid,
    pub plan: PlanTier,
    pub state: LicenseState,
    pub ends_at: Option<DateTime<Utc>>,
    pub days_remaining: Option<i64>,
}

impl LicenseDigest {
    fn of(license: &License, now: DateTime<Utc>) -> Self {
        Self {
            id: license.id,
            plan: license.plan,
            state: license.state,
            ends_at: license.ends_at,
            days_remaining: days_remaining(license.ends_at, now),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantSummary {
    #[serde(flatten)]
    pub tenant: Tenant,
    pub license: Option<LicenseDigest>,
    pub users: UserStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct OwnerSummary {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub email: String,
    pub active: bool,
    pub locked: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<&User> for OwnerSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            active: user.active,
            locked: user.locked,
            last_login_at: user.last_login_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TenantMetrics {
    pub total_users: i64,
    pub active_users: i64,
    pub last_login_at: Option<DateTime<Utc>>,
    pub live_sessions: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    NoActivity,
    LicenseExpiring,
    LicenseExpired,
    UserLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Danger,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantHealth {
    pub days_since_last_access: Option<i64>,
    pub alerts: Vec<Alert>,
}

impl TenantHealth {
    pub fn assess(metrics: &TenantMetrics, license: Option<&License>, now: DateTime<Utc>) -> Self {
        let days_since_last_access = metrics.last_login_at.map(|at| (now - at).num_days());
        let mut alerts = Vec::new();

        if let Some(idle) = days_since_last_access.filter(|d| *d > INACTIVE_WARNING_DAYS) {
            alerts.push(Alert {
                kind: AlertKind::NoActivity,
                severity: if idle > INACTIVE_DANGER_DAYS {
                    Severity::Danger
                } else {
                    Severity::Warning
                },
                message: format!("No logins for {} days", idle),
            });
        }

        if let Some(license) = license {
            let remaining = days_remaining(license.ends_at, now);
            let lapsed = license.state == LicenseState::Expired
                || (license.state.is_entitled() && remaining.is_some_and(|d| d <= 0));

            if lapsed {
                alerts.push(Alert {
                    kind: AlertKind::LicenseExpired,
                    severity: Severity::Danger,
                    message: "License has expired".to_string(),
                });
            } else if let Some(days) = remaining.filter(|d| license.state.is_entitled() && *d <= EXPIRING_WARNING_DAYS) {
                alerts.push(Alert {
                    kind: AlertKind::LicenseExpiring,
                    severity: if days <= EXPIRING_DANGER_DAYS {
                        Severity::Danger
                    } else {
                        Severity::Warning
                    },
                    message: format!("License expires in {} day(s)", days),
                });
            }

            if license.state.is_open() && metrics.total_users >= i64::from(license.max_users) {
                alerts.push(Alert {
                    kind: AlertKind::UserLimit,
                    severity: Severity::Warning,
                    message: format!("{} of {} users in use", metrics.total_users, license.max_users),
                });
            }
        }

        Self {
            days_since_last_access,
            alerts,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantDetail {
    pub tenant: Tenant,
    pub license: Option<LicenseView>,
    pub licenses: Vec<LicenseView>,
    pub owner: Option<OwnerSummary>,
    pub metrics: TenantMetrics,
    pub health: TenantHealth,
}

#[derive(Debug, Clone, Serialize)]
pub struct OwnerPasswordReset {
    pub user_id: Uuid,
    pub email: String,
    pub temporary_password: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TenantCounts {
    pub total: usize,
    pub active: usize,
    pub suspended: usize,
    pub on_trial: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LicenseCounts {
    pub entitled: usize,
    pub expiring_soon: usize,
    pub expired: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub tenants: TenantCounts,
    pub licenses: LicenseCounts,
    pub users: i64,
    pub expiring_soon_days: i64,
}

/// Lowercase ASCII slug with single dashes, e.g. "Café Real 2" -> "caf-real-2"
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "tenant".to_string()
    } else {
        slug
    }
}

/// Local part of the email with anything outside `[a-z0-9_]` replaced by `_`
pub fn username_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    local
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Trims and lowercases, then checks the address has a local part and a dotted domain
pub fn normalize_email(field: &'static str, email: &str) -> Result<String, ServiceError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(ServiceError::validation(field, "Invalid email address"))
    }
}

fn duplicate_email(email: &str) -> impl FnOnce(DatabaseError) -> ServiceError + '_ {
    move |err| match err {
        DatabaseError::UniqueViolation(constraint) if constraint == "users_email_key" => {
            ServiceError::DuplicateEmail(email.to_string())
        }
        other => other.into(),
    }
}

/// A tenant that exists, is not the platform tenant and has not been deleted
pub(crate) fn live(tenant: Option<Tenant>) -> Result<Tenant, ServiceError> {
    match tenant {
        Some(t) if t.id == SYSTEM_TENANT_ID => Err(ServiceError::TenantNotFound),
        Some(t) if t.is_deleted() => Err(ServiceError::TenantDeleted),
        Some(t) => Ok(t),
        None => Err(ServiceError::TenantNotFound),
    }
}

/// Tenant onboarding, soft delete and the owner-facing support operations
pub struct TenantService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    audit: Arc<AuditService>,
    bcrypt_cost: u32,
    expiring_soon_days: i64,
}

impl TenantService {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        audit: Arc<AuditService>,
        bcrypt_cost: u32,
        expiring_soon_days: i64,
    ) -> Self {
        Self {
            store,
            clock,
            audit,
            bcrypt_cost,
            expiring_soon_days,
        }
    }

    /// Creates tenant, administrator role, owner account and default catalog in one transaction
    pub async fn create(&self, actor: &Actor, request: CreateTenant) -> Result<CreatedTenant, ServiceError> {
        let name = request.name.trim().to_string();
        if name.chars().count() < MIN_TENANT_NAME {
            return Err(ServiceError::validation("name", "Name must be at least 3 characters"));
        }
        let owner_name = request.owner_name.trim().to_string();
        if owner_name.chars().count() < MIN_OWNER_NAME {
            return Err(ServiceError::validation("ownerName", "Owner name must be at least 2 characters"));
        }
        let owner_email = normalize_email("ownerEmail", &request.owner_email)?;

        let temporary_password = generate_temporary_password();
        let password_hash = hash_password(&temporary_password, self.bcrypt_cost).await?;

        let mut tx = self.store.begin().await?;

        if tx.find_user_by_email(&owner_email).await?.is_some() {
            return Err(ServiceError::DuplicateEmail(owner_email));
        }

        let base = slugify(&name);
        let mut slug = base.clone();
        let mut suffix = 2;
        while tx.slug_exists(&slug).await? {
            slug = format!("{}-{}", base, suffix);
            suffix += 1;
        }

        let now = self.clock.now();
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name,
            slug,
            email: Some(owner_email.clone()),
            phone: request.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
            address: request.address.map(|a| a.trim().to_string()).filter(|a| !a.is_empty()),
            plan: None,
            status: TenantStatus::Active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            deleted_by: None,
            delete_reason: None,
            delete_detail: None,
        };
        tx.insert_tenant(&tenant).await?;

        let role = Role {
            id: Uuid::new_v4(),
            tenant_id: tenant.id,
            name: ADMINISTRATOR_ROLE.to_string(),
            description: Some("Full access to every module".to_string()),
            created_at: now,
        };
        tx.insert_role(&role).await?;
        let permissions = tx.attach_all_permissions(role.id).await?;

        let owner = User {
            id: Uuid::new_v4(),
            tenant_id: tenant.id,
            role_id: Some(role.id),
            name: owner_name,
            username: username_from_email(&owner_email),
            email: owner_email.clone(),
            password_hash,
            active: true,
            locked: false,
            is_operator: false,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        tx.insert_user(&owner).await.map_err(duplicate_email(&owner_email))?;

        let categories: Vec<Category> = DEFAULT_CATEGORIES
            .iter()
            .zip(1..)
            .map(|(name, position)| Category {
                id: Uuid::new_v4(),
                tenant_id: tenant.id,
                name: (*name).to_string(),
                position,
                created_at: now,
            })
            .collect();
        let categories = tx.insert_categories(&categories).await?;

        self.audit
            .record(
                tx.as_mut(),
                actor,
                AuditAction::TenantCreated,
                Some(tenant.id),
                Some(owner.id),
                json!({
                    "name": tenant.name,
                    "slug": tenant.slug,
                    "owner_email": owner.email,
                    "permissions": permissions,
                    "categories": categories,
                }),
            )
            .await?;
        tx.commit().await?;

        info!("{} created tenant {} ({})", actor.label(), tenant.slug, tenant.id);
        Ok(CreatedTenant {
            owner: OwnerCredentials {
                user_id: owner.id,
                name: owner.name,
                username: owner.username,
                email: owner.email,
                temporary_password,
            },
            tenant,
        })
    }

    /// Soft delete with its cascade. Every guard is checked before the first
    /// write, and the existence checks are repeated under the row lock.
    /// Any failure is recorded as `tenant_delete_failed` after rollback.
    pub async fn delete(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        request: DeleteTenant,
    ) -> Result<DeletionSummary, ServiceError> {
        let reason = request.reason.clone();
        match self.delete_guarded(actor, tenant_id, request).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                warn!("{} failed to delete tenant {}: {}", actor.label(), tenant_id, e);
                self.audit
                    .record_failure(
                        actor,
                        AuditAction::TenantDeleteFailed,
                        Some(tenant_id),
                        &e,
                        json!({ "reason": reason }),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn delete_guarded(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        request: DeleteTenant,
    ) -> Result<DeletionSummary, ServiceError> {
        let operator_id = actor
            .operator_id
            .ok_or_else(|| ServiceError::Forbidden("Only an operator can delete a tenant".to_string()))?;

        let reason: DeleteReason = request
            .reason
            .parse()
            .map_err(|_| ServiceError::validation("reason", format!("Unknown delete reason '{}'", request.reason)))?;
        let detail = request.detail.map(|d| d.trim().to_string()).filter(|d| !d.is_empty());
        if reason == DeleteReason::Other && detail.as_ref().map_or(0, |d| d.chars().count()) < MIN_OTHER_DETAIL {
            return Err(ServiceError::validation(
                "detail",
                "Explain the reason in at least 10 characters",
            ));
        }

        self.reverify_operator(operator_id, &request.operator_password).await?;

        let mut tx = self.store.begin().await?;
        let tenant = match tx.lock_tenant(tenant_id).await? {
            Some(t) if t.id == SYSTEM_TENANT_ID => {
                return Err(ServiceError::Forbidden("The platform tenant cannot be deleted".to_string()));
            }
            other => live(other)?,
        };
        if request.confirm_text != format!("DELETE {}", tenant.name) {
            return Err(ServiceError::ConfirmationMismatch);
        }

        let now = self.clock.now();
        tx.mark_tenant_deleted(
            tenant.id,
            &TenantDeletion {
                deleted_by: operator_id,
                reason,
                detail: detail.clone(),
                deleted_at: now,
            },
        )
        .await?;
        let users_deactivated = tx.deactivate_tenant_users(tenant.id, now).await?;
        let sessions_invalidated = tx.delete_tenant_sessions(tenant.id).await?;
        let licenses_cancelled = tx
            .cancel_open_licenses(tenant.id, &format!("tenant deleted: {}", reason), now)
            .await?;
        let mut impersonations_closed = 0;
        for started in tx.open_impersonations(tenant.id).await? {
            let record = started.closing(
                ImpersonationEvent::Ended,
                actor.closed_by(),
                json!({ "closed_by": "tenant_deleted" }),
                now,
            );
            if tx.insert_impersonation(&record).await? {
                impersonations_closed += 1;
            }
        }

        self.audit
            .record(
                tx.as_mut(),
                actor,
                AuditAction::TenantDeleted,
                Some(tenant.id),
                None,
                json!({
                    "name": tenant.name,
                    "reason": reason,
                    "detail": detail,
                    "users_deactivated": users_deactivated,
                    "sessions_invalidated": sessions_invalidated,
                    "licenses_cancelled": licenses_cancelled,
                    "impersonations_closed": impersonations_closed,
                }),
            )
            .await?;
        tx.commit().await?;

        info!(
            "{} deleted tenant {} ({}): {} users deactivated, {} sessions invalidated, {} impersonations closed",
            actor.label(),
            tenant.slug,
            tenant.id,
            users_deactivated,
            sessions_invalidated,
            impersonations_closed
        );
        Ok(DeletionSummary {
            tenant_id: tenant.id,
            deleted_at: now,
            users_deactivated,
            sessions_invalidated,
            licenses_cancelled,
            impersonations_closed,
        })
    }

    /// Checks the acting operator's password. The lookup transaction is
    /// closed before bcrypt runs.
    async fn reverify_operator(&self, operator_id: Uuid, password: &str) -> Result<(), ServiceError> {
        let operator = {
            let mut tx = self.store.begin().await?;
            tx.find_user(operator_id).await?
        };
        let operator = operator
            .filter(|u| u.is_operator && u.active)
            .ok_or_else(|| ServiceError::Forbidden("Operator account is no longer active".to_string()))?;

        if verify_password(password, &operator.password_hash).await? {
            Ok(())
        } else {
            Err(ServiceError::WrongPassword)
        }
    }

    /// Live tenants, newest first, with their latest license and user counts
    pub async fn list(&self, status: Option<TenantStatus>) -> Result<Vec<TenantSummary>, ServiceError> {
        if status == Some(TenantStatus::Deleted) {
            return Err(ServiceError::validation("status", "Deleted tenants have their own listing"));
        }

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let tenants = tx.list_tenants(&TenantFilter { status, deleted: false }).await?;
        let licenses: HashMap<Uuid, License> = tx
            .latest_licenses()
            .await?
            .into_iter()
            .map(|l| (l.tenant_id, l))
            .collect();
        let stats = tx.user_stats_by_tenant().await?;

        Ok(tenants
            .into_iter()
            .map(|tenant| TenantSummary {
                license: licenses.get(&tenant.id).map(|l| LicenseDigest::of(l, now)),
                users: stats.get(&tenant.id).copied().unwrap_or_default(),
                tenant,
            })
            .collect())
    }

    pub async fn list_deleted(&self) -> Result<Vec<Tenant>, ServiceError> {
        let mut tx = self.store.begin().await?;
        Ok(tx
            .list_tenants(&TenantFilter {
                status: None,
                deleted: true,
            })
            .await?)
    }

    pub async fn detail(&self, tenant_id: Uuid) -> Result<TenantDetail, ServiceError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        // Deleted tenants are only visible through the deleted listing
        let tenant = live(tx.find_tenant(tenant_id).await?).map_err(|e| match e {
            ServiceError::TenantDeleted => ServiceError::TenantNotFound,
            other => other,
        })?;

        let history = tx.license_history(tenant.id, RECENT_LICENSES).await?;
        let current = history.iter().find(|l| l.state.is_open()).or_else(|| history.first()).cloned();
        let owner = tx.find_owner(tenant.id).await?;
        let stats = tx.user_stats(tenant.id).await?;
        let live_sessions = tx.count_live_sessions(tenant.id, now).await?;

        let metrics = TenantMetrics {
            total_users: stats.total,
            active_users: stats.active,
            last_login_at: stats.last_login_at,
            live_sessions,
        };
        let health = TenantHealth::assess(&metrics, current.as_ref(), now);

        Ok(TenantDetail {
            tenant,
            license: current.map(|l| LicenseView::at(l, now)),
            licenses: history.into_iter().map(|l| LicenseView::at(l, now)).collect(),
            owner: owner.as_ref().map(OwnerSummary::from),
            metrics,
            health,
        })
    }

    pub async fn set_status(&self, actor: &Actor, tenant_id: Uuid, status: TenantStatus) -> Result<Tenant, ServiceError> {
        let action = match status {
            TenantStatus::Active => AuditAction::TenantActivated,
            TenantStatus::Suspended => AuditAction::TenantSuspended,
            TenantStatus::Deleted => {
                return Err(ServiceError::validation("status", "Use the delete operation to delete a tenant"));
            }
        };

        let mut tx = self.store.begin().await?;
        let mut tenant = live(tx.lock_tenant(tenant_id).await?)?;
        let previous = tenant.status;

        let now = self.clock.now();
        tx.update_tenant_status(tenant.id, status, now).await?;
        self.audit
            .record(
                tx.as_mut(),
                actor,
                action,
                Some(tenant.id),
                None,
                json!({ "from": previous, "to": status }),
            )
            .await?;
        tx.commit().await?;

        info!("{} set tenant {} status to {}", actor.label(), tenant.id, status);
        tenant.status = status;
        tenant.updated_at = now;
        Ok(tenant)
    }

    /// Opens a transaction holding the tenant lock and its owner account
    async fn owner_of(&self, tenant_id: Uuid) -> Result<(Box<dyn StoreTx>, User), ServiceError> {
        let mut tx = self.store.begin().await?;
        let tenant = live(tx.lock_tenant(tenant_id).await?)?;
        let owner = tx.find_owner(tenant.id).await?.ok_or(ServiceError::OwnerNotFound)?;
        Ok((tx, owner))
    }

    pub async fn reset_owner_password(&self, actor: &Actor, tenant_id: Uuid) -> Result<OwnerPasswordReset, ServiceError> {
        let temporary_password = generate_temporary_password();
        let hash = hash_password(&temporary_password, self.bcrypt_cost).await?;

        let (mut tx, owner) = self.owner_of(tenant_id).await?;
        tx.set_password_hash(owner.id, &hash, self.clock.now()).await?;
        self.audit
            .record(
                tx.as_mut(),
                actor,
                AuditAction::OwnerPasswordReset,
                Some(tenant_id),
                Some(owner.id),
                json!({ "email": owner.email }),
            )
            .await?;
        tx.commit().await?;

        info!("{} reset the owner password of tenant {}", actor.label(), tenant_id);
        Ok(OwnerPasswordReset {
            user_id: owner.id,
            email: owner.email,
            temporary_password,
        })
    }

    pub async fn change_owner_email(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        new_email: &str,
    ) -> Result<OwnerSummary, ServiceError> {
        let new_email = normalize_email("newEmail", new_email)?;

        let (mut tx, mut owner) = self.owner_of(tenant_id).await?;
        if let Some(existing) = tx.find_user_by_email(&new_email).await? {
            if existing.id != owner.id {
                return Err(ServiceError::DuplicateEmail(new_email));
            }
        }

        let now = self.clock.now();
        tx.set_email(owner.id, &new_email, now)
            .await
            .map_err(duplicate_email(&new_email))?;
        self.audit
            .record(
                tx.as_mut(),
                actor,
                AuditAction::OwnerEmailChanged,
                Some(tenant_id),
                Some(owner.id),
                json!({ "from": owner.email, "to": new_email }),
            )
            .await?;
        tx.commit().await?;

        info!("{} changed the owner email of tenant {}", actor.label(), tenant_id);
        owner.email = new_email;
        owner.updated_at = now;
        Ok(OwnerSummary::from(&owner))
    }

    pub async fn set_owner_lock(&self, actor: &Actor, tenant_id: Uuid, lock: bool) -> Result<OwnerSummary, ServiceError> {
        let (mut tx, mut owner) = self.owner_of(tenant_id).await?;

        let now = self.clock.now();
        tx.set_locked(owner.id, lock, now).await?;
        let action = if lock {
            AuditAction::OwnerLocked
        } else {
            AuditAction::OwnerUnlocked
        };
        self.audit
            .record(
                tx.as_mut(),
                actor,
                action,
                Some(tenant_id),
                Some(owner.id),
                json!({ "email": owner.email, "locked": lock }),
            )
            .await?;
        tx.commit().await?;

        info!("{} {} the owner of tenant {}", actor.label(), action, tenant_id);
        owner.locked = lock;
        owner.updated_at = now;
        Ok(OwnerSummary::from(&owner))
    }

    /// Deletes every session of the tenant, returning how many there were
    pub async fn logout_all(&self, actor: &Actor, tenant_id: Uuid) -> Result<u64, ServiceError> {
        let mut tx = self.store.begin().await?;
        let tenant = live(tx.lock_tenant(tenant_id).await?)?;

        let sessions = tx.delete_tenant_sessions(tenant.id).await?;
        self.audit
            .record(
                tx.as_mut(),
                actor,
                AuditAction::SessionsRevoked,
                Some(tenant.id),
                None,
                json!({ "sessions_invalidated": sessions }),
            )
            .await?;
        tx.commit().await?;

        info!("{} revoked {} session(s) of tenant {}", actor.label(), sessions, tenant.id);
        Ok(sessions)
    }

    pub async fn dashboard(&self) -> Result<Dashboard, ServiceError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let tenants = tx.list_tenants(&TenantFilter::default()).await?;
        let licenses: HashMap<Uuid, License> = tx
            .latest_licenses()
            .await?
            .into_iter()
            .map(|l| (l.tenant_id, l))
            .collect();
        let stats = tx.user_stats_by_tenant().await?;

        let mut dashboard = Dashboard {
            tenants: TenantCounts::default(),
            licenses: LicenseCounts::default(),
            users: 0,
            expiring_soon_days: self.expiring_soon_days,
        };

        for tenant in &tenants {
            dashboard.tenants.total += 1;
            match tenant.status {
                TenantStatus::Active => dashboard.tenants.active += 1,
                TenantStatus::Suspended => dashboard.tenants.suspended += 1,
                TenantStatus::Deleted => {}
            }
            dashboard.users += stats.get(&tenant.id).map_or(0, |s| s.total);

            let Some(license) = licenses.get(&tenant.id) else {
                continue;
            };
            if license.state == LicenseState::Trial {
                dashboard.tenants.on_trial += 1;
            }

            let remaining = days_remaining(license.ends_at, now);
            let lapsed = remaining.is_some_and(|d| d <= 0);
            if license.state == LicenseState::Expired || (license.state.is_entitled() && lapsed) {
                dashboard.licenses.expired += 1;
            } else if license.state.is_entitled() {
                dashboard.licenses.entitled += 1;
                if remaining.is_some_and(|d| d <= self.expiring_soon_days) {
                    dashboard.licenses.expiring_soon += 1;
                }
            }
        }

        Ok(dashboard)
    }
}
