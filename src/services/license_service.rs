use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::audit_service::{Actor, AuditService};
use super::error::ServiceError;
use super::license_state::{self, days_remaining, Issue};
use super::tenant_service::live;
use crate::clock::Clock;
use crate::database::models::{License, LicenseFilter, PlanDefinition};
use crate::database::{Store, StoreTx};
use crate::types::{plan_label, AuditAction, PlanTier};

/// A license with its derived `days_remaining` at the time it was read
#[derive(Debug, Clone, Serialize)]
pub struct LicenseView {
    #[serde(flatten)]
    pub license: License,
    pub days_remaining: Option<i64>,
}

impl LicenseView {
    pub fn at(license: License, now: DateTime<Utc>) -> Self {
        let days_remaining = days_remaining(license.ends_at, now);
        Self { license, days_remaining }
    }
}

#[derive(Debug, Clone)]
pub struct IssueLicense {
    pub tenant_id: Uuid,
    pub plan: PlanTier,
    /// Defaults to the plan's duration
    pub duration_days: Option<i64>,
    pub is_trial: bool,
    pub max_users: Option<i32>,
    pub max_tables: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResumeOutcome {
    #[serde(flatten)]
    pub license: LicenseView,
    pub credited_days: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanChange {
    pub tenant_id: Uuid,
    #[serde(with = "crate::types::plan_label_serde")]
    pub previous_plan: Option<PlanTier>,
    pub plan: PlanTier,
    pub license: Option<LicenseView>,
}

/// License state machine operations, each in one transaction with its audit record
pub struct LicenseService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    audit: Arc<AuditService>,
}

impl LicenseService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, audit: Arc<AuditService>) -> Self {
        Self { store, clock, audit }
    }

    /// Current definition of `tier`, refused when the tier has been withdrawn
    async fn available_plan(tx: &mut dyn StoreTx, tier: PlanTier) -> Result<PlanDefinition, ServiceError> {
        tx.current_plan(tier)
            .await?
            .filter(|plan| plan.active)
            .ok_or_else(|| ServiceError::validation("plan", format!("Plan '{}' is not available", tier)))
    }

    /// Supersedes the tenant's open license, if any, and inserts a new one
    pub async fn issue(&self, actor: &Actor, request: IssueLicense) -> Result<LicenseView, ServiceError> {
        let mut tx = self.store.begin().await?;

        let tenant = live(tx.lock_tenant(request.tenant_id).await?)?;
        let plan = Self::available_plan(tx.as_mut(), request.plan).await?;

        let now = self.clock.now();
        let license = license_state::issue(
            Issue {
                tenant_id: tenant.id,
                duration_days: request.duration_days.unwrap_or(i64::from(plan.duration_days)),
                is_trial: request.is_trial,
                max_users: request.max_users,
                max_tables: request.max_tables,
                notes: request.notes,
                issued_by: actor.operator_id,
            },
            &plan,
            now,
        )?;

        let superseded = tx.supersede_open_licenses(tenant.id, now).await?;
        tx.insert_license(&license).await?;
        tx.set_tenant_plan(tenant.id, Some(plan.tier), now).await?;

        self.audit
            .record(
                tx.as_mut(),
                actor,
                AuditAction::LicenseIssued,
                Some(tenant.id),
                None,
                json!({
                    "license_id": license.id,
                    "plan": plan.tier,
                    "plan_version": plan.version,
                    "state": license.state,
                    "starts_at": license.starts_at,
                    "ends_at": license.ends_at,
                    "superseded": superseded,
                }),
            )
            .await?;
        tx.commit().await?;

        info!(
            "{} issued {} license {} to tenant {} (superseded {})",
            actor.label(),
            license.state,
            license.id,
            tenant.id,
            superseded
        );
        Ok(LicenseView::at(license, now))
    }

    pub async fn extend(
        &self,
        actor: &Actor,
        license_id: Uuid,
        days: i64,
        reason: Option<String>,
    ) -> Result<LicenseView, ServiceError> {
        let mut tx = self.store.begin().await?;
        let mut license = tx.lock_license(license_id).await?.ok_or(ServiceError::LicenseNotFound)?;

        let now = self.clock.now();
        let previous_end = license.ends_at;
        license_state::extend(&mut license, days, reason.clone(), now)?;
        tx.update_license(&license).await?;

        self.audit
            .record(
                tx.as_mut(),
                actor,
                AuditAction::LicenseExtended,
                Some(license.tenant_id),
                None,
                json!({
                    "license_id": license.id,
                    "days": days,
                    "reason": reason,
                    "previous_end": previous_end,
                    "new_end": license.ends_at,
                }),
            )
            .await?;
        tx.commit().await?;

        info!("{} extended license {} by {} days", actor.label(), license.id, days);
        Ok(LicenseView::at(license, now))
    }

    pub async fn pause(&self, actor: &Actor, license_id: Uuid, reason: String) -> Result<LicenseView, ServiceError> {
        let reason = reason.trim().to_string();
        if reason.is_empty() {
            return Err(ServiceError::validation("reason", "A reason is required to pause a license"));
        }

        let mut tx = self.store.begin().await?;
        let mut license = tx.lock_license(license_id).await?.ok_or(ServiceError::LicenseNotFound)?;

        let now = self.clock.now();
        license_state::pause(&mut license, reason.clone(), now)?;
        tx.update_license(&license).await?;

        self.audit
            .record(
                tx.as_mut(),
                actor,
                AuditAction::LicensePaused,
                Some(license.tenant_id),
                None,
                json!({
                    "license_id": license.id,
                    "reason": reason,
                    "days_remaining": days_remaining(license.ends_at, now),
                }),
            )
            .await?;
        tx.commit().await?;

        info!("{} paused license {}", actor.label(), license.id);
        Ok(LicenseView::at(license, now))
    }

    pub async fn resume(&self, actor: &Actor, license_id: Uuid) -> Result<ResumeOutcome, ServiceError> {
        let mut tx = self.store.begin().await?;
        let mut license = tx.lock_license(license_id).await?.ok_or(ServiceError::LicenseNotFound)?;

        let now = self.clock.now();
        let paused_at = license.paused_at;
        let credited_days = license_state::resume(&mut license, now)?;
        tx.update_license(&license).await?;

        self.audit
            .record(
                tx.as_mut(),
                actor,
                AuditAction::LicenseResumed,
                Some(license.tenant_id),
                None,
                json!({
                    "license_id": license.id,
                    "paused_at": paused_at,
                    "credited_days": credited_days,
                    "new_end": license.ends_at,
                }),
            )
            .await?;
        tx.commit().await?;

        info!(
            "{} resumed license {} crediting {} days",
            actor.label(),
            license.id,
            credited_days
        );
        Ok(ResumeOutcome {
            license: LicenseView::at(license, now),
            credited_days,
        })
    }

    /// Moves the tenant to `plan` and resets the open license's caps and features
    /// to that plan's current defaults. State and dates are untouched.
    pub async fn change_plan(
        &self,
        actor: &Actor,
        tenant_id: Uuid,
        plan: PlanTier,
        reason: Option<String>,
    ) -> Result<PlanChange, ServiceError> {
        let mut tx = self.store.begin().await?;

        let tenant = live(tx.lock_tenant(tenant_id).await?)?;
        let definition = Self::available_plan(tx.as_mut(), plan).await?;

        let now = self.clock.now();
        tx.set_tenant_plan(tenant.id, Some(plan), now).await?;

        let license = match tx.lock_open_license(tenant.id).await? {
            Some(mut license) => {
                license_state::apply_plan(&mut license, &definition, reason.clone(), now);
                tx.update_license(&license).await?;
                Some(license)
            }
            None => None,
        };

        self.audit
            .record(
                tx.as_mut(),
                actor,
                AuditAction::PlanChanged,
                Some(tenant.id),
                None,
                json!({
                    "from": plan_label(tenant.plan),
                    "to": plan,
                    "plan_version": definition.version,
                    "reason": reason,
                    "license_id": license.as_ref().map(|l| l.id),
                }),
            )
            .await?;
        tx.commit().await?;

        info!(
            "{} changed plan of tenant {} from {} to {}",
            actor.label(),
            tenant.id,
            plan_label(tenant.plan),
            plan
        );
        Ok(PlanChange {
            tenant_id: tenant.id,
            previous_plan: tenant.plan,
            plan,
            license: license.map(|l| LicenseView::at(l, now)),
        })
    }

    /// Expires every trial/active license whose end has passed. Idempotent.
    pub async fn expire_sweep(&self) -> Result<Vec<License>, ServiceError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let expired = tx.expire_lapsed_licenses(now).await?;
        tx.commit().await?;

        if !expired.is_empty() {
            info!("Expire sweep moved {} license(s) to expired", expired.len());
        }
        Ok(expired)
    }

    pub async fn list(&self, filter: &LicenseFilter) -> Result<Vec<LicenseView>, ServiceError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let licenses = tx.list_licenses(filter).await?;
        Ok(licenses.into_iter().map(|l| LicenseView::at(l, now)).collect())
    }

    pub async fn find(&self, license_id: Uuid) -> Result<LicenseView, ServiceError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let license = tx.find_license(license_id).await?.ok_or(ServiceError::LicenseNotFound)?;
        Ok(LicenseView::at(license, now))
    }
}
