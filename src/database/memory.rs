//! In-process `Store` used in development without `DATABASE_URL` and by the test suite.
//!
//! Transactions are serialized: `begin` takes the store lock and works on a
//! copy of the state, which replaces the shared state only on `commit`.
//! Uniqueness rules mirror the Postgres indexes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::manager::DatabaseError;
use super::models::{
    AuditRecord, Category, ImpersonationRecord, License, LicenseFilter, PlanDefinition, Role, Session, Tenant,
    TenantDeletion, TenantFilter, User, UserStats, SYSTEM_PERMISSIONS,
};
use super::store::{Store, StoreResult, StoreTx};
use crate::types::{LicenseState, PlanTier, TenantStatus, SYSTEM_TENANT_ID};

type Faults = Arc<std::sync::Mutex<HashSet<&'static str>>>;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tenants: Vec<Tenant>,
    users: Vec<User>,
    roles: Vec<Role>,
    permissions: Vec<String>,
    grants: Vec<(Uuid, String)>,
    categories: Vec<Category>,
    sessions: Vec<Session>,
    licenses: Vec<License>,
    audit: Vec<AuditRecord>,
    impersonations: Vec<ImpersonationRecord>,
    plans: Vec<PlanDefinition>,
}

#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Faults,
}

impl MemoryStore {
    /// Empty store seeded like a freshly migrated database
    pub fn new() -> Self {
        let now = Utc::now();
        let state = MemoryState {
            tenants: vec![Tenant {
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
            }],
            permissions: SYSTEM_PERMISSIONS.iter().map(|p| p.to_string()).collect(),
            plans: PlanTier::ALL.iter().map(|tier| PlanDefinition::builtin(*tier, now)).collect(),
            ..MemoryState::default()
        };

        Self {
            state: Arc::new(Mutex::new(state)),
            faults: Arc::default(),
        }
    }

    /// Make every later call of the named `StoreTx` method fail
    pub fn fail_operation(&self, operation: &'static str) {
        self.faults.lock().unwrap_or_else(|e| e.into_inner()).insert(operation);
    }

    pub fn clear_failures(&self) {
        self.faults.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Committed row counts. Waits for any open transaction to finish.
    pub async fn row_counts(&self) -> RowCounts {
        let state = self.state.lock().await;
        RowCounts {
            tenants: state.tenants.len(),
            users: state.users.len(),
            roles: state.roles.len(),
            role_permissions: state.grants.len(),
            categories: state.categories.len(),
            licenses: state.licenses.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowCounts {
    pub tenants: usize,
    pub users: usize,
    pub roles: usize,
    pub role_permissions: usize,
    pub categories: usize,
    pub licenses: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            working,
            faults: self.faults.clone(),
        }))
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    faults: Faults,
}

impl MemoryTx {
    fn check(&self, operation: &'static str) -> StoreResult<()> {
        let faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        if faults.contains(operation) {
            Err(DatabaseError::Injected(operation))
        } else {
            Ok(())
        }
    }

    fn tenant_mut(&mut self, id: Uuid) -> Option<&mut Tenant> {
        self.working.tenants.iter_mut().find(|t| t.id == id)
    }

    fn user_mut(&mut self, id: Uuid) -> Option<&mut User> {
        self.working.users.iter_mut().find(|u| u.id == id)
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.working
            .users
            .iter()
            .any(|u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
    }

    fn open_license_index(&self, tenant_id: Uuid) -> Option<usize> {
        self.working
            .licenses
            .iter()
            .position(|l| l.tenant_id == tenant_id && l.state.is_open())
    }

    fn session_closed(&self, session_id: Uuid) -> bool {
        self.working
            .impersonations
            .iter()
            .any(|r| r.session_id == session_id && r.event.closes_session())
    }
}

/// Newest first; ties keep reverse insertion order.
fn newest_first<T: Clone>(items: &[T], created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    let mut out: Vec<T> = items.iter().rev().cloned().collect();
    out.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    out
}

fn take(limit: i64) -> usize {
    usize::try_from(limit.max(0)).unwrap_or(usize::MAX)
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.check("commit")?;
        let MemoryTx { mut guard, working, .. } = *self;
        *guard = working;
        Ok(())
    }

    async fn find_tenant(&mut self, id: Uuid) -> StoreResult<Option<Tenant>> {
        self.check("find_tenant")?;
        Ok(self.working.tenants.iter().find(|t| t.id == id).cloned())
    }

    async fn lock_tenant(&mut self, id: Uuid) -> StoreResult<Option<Tenant>> {
        self.check("lock_tenant")?;
        Ok(self.working.tenants.iter().find(|t| t.id == id).cloned())
    }

    async fn slug_exists(&mut self, slug: &str) -> StoreResult<bool> {
        self.check("slug_exists")?;
        Ok(self.working.tenants.iter().any(|t| t.slug == slug))
    }

    async fn insert_tenant(&mut self, tenant: &Tenant) -> StoreResult<()> {
        self.check("insert_tenant")?;
        if self.working.tenants.iter().any(|t| t.slug == tenant.slug) {
            return Err(DatabaseError::UniqueViolation("tenants_slug_key".to_string()));
        }
        self.working.tenants.push(tenant.clone());
        Ok(())
    }

    async fn list_tenants(&mut self, filter: &TenantFilter) -> StoreResult<Vec<Tenant>> {
        self.check("list_tenants")?;
        let matching: Vec<Tenant> = self
            .working
            .tenants
            .iter()
            .filter(|t| t.id != SYSTEM_TENANT_ID)
            .filter(|t| t.deleted_at.is_some() == filter.deleted)
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        Ok(newest_first(&matching, |t| t.created_at))
    }

    async fn update_tenant_status(&mut self, id: Uuid, status: TenantStatus, now: DateTime<Utc>) -> StoreResult<()> {
        self.check("update_tenant_status")?;
        if let Some(tenant) = self.tenant_mut(id) {
            tenant.status = status;
            tenant.updated_at = now;
        }
        Ok(())
    }

    async fn set_tenant_plan(&mut self, id: Uuid, plan: Option<PlanTier>, now: DateTime<Utc>) -> StoreResult<()> {
        self.check("set_tenant_plan")?;
        if let Some(tenant) = self.tenant_mut(id) {
            tenant.plan = plan;
            tenant.updated_at = now;
        }
        Ok(())
    }

    async fn mark_tenant_deleted(&mut self, id: Uuid, deletion: &TenantDeletion) -> StoreResult<()> {
        self.check("mark_tenant_deleted")?;
        if let Some(tenant) = self.tenant_mut(id) {
            tenant.status = TenantStatus::Deleted;
            tenant.deleted_at = Some(deletion.deleted_at);
            tenant.deleted_by = Some(deletion.deleted_by);
            tenant.delete_reason = Some(deletion.reason);
            tenant.delete_detail = deletion.detail.clone();
            tenant.updated_at = deletion.deleted_at;
        }
        Ok(())
    }

    async fn find_user(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        self.check("find_user")?;
        Ok(self.working.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>> {
        self.check("find_user_by_email")?;
        Ok(self
            .working
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        self.check("insert_user")?;
        if self.email_taken(&user.email, None) {
            return Err(DatabaseError::UniqueViolation("users_email_key".to_string()));
        }
        self.working.users.push(user.clone());
        Ok(())
    }

    async fn find_owner(&mut self, tenant_id: Uuid) -> StoreResult<Option<User>> {
        self.check("find_owner")?;
        Ok(self
            .working
            .users
            .iter()
            .filter(|u| u.tenant_id == tenant_id && !u.is_operator)
            .min_by_key(|u| u.created_at)
            .cloned())
    }

    async fn set_password_hash(&mut self, user_id: Uuid, hash: &str, now: DateTime<Utc>) -> StoreResult<()> {
        self.check("set_password_hash")?;
        if let Some(user) = self.user_mut(user_id) {
            user.password_hash = hash.to_string();
            user.updated_at = now;
        }
        Ok(())
    }

    async fn set_email(&mut self, user_id: Uuid, email: &str, now: DateTime<Utc>) -> StoreResult<()> {
        self.check("set_email")?;
        if self.email_taken(email, Some(user_id)) {
            return Err(DatabaseError::UniqueViolation("users_email_key".to_string()));
        }
        if let Some(user) = self.user_mut(user_id) {
            user.email = email.to_string();
            user.updated_at = now;
        }
        Ok(())
    }

    async fn set_locked(&mut self, user_id: Uuid, locked: bool, now: DateTime<Utc>) -> StoreResult<()> {
        self.check("set_locked")?;
        if let Some(user) = self.user_mut(user_id) {
            user.locked = locked;
            user.updated_at = now;
        }
        Ok(())
    }

    async fn touch_last_login(&mut self, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        self.check("touch_last_login")?;
        if let Some(user) = self.user_mut(user_id) {
            user.last_login_at = Some(now);
        }
        Ok(())
    }

    async fn deactivate_tenant_users(&mut self, tenant_id: Uuid, now: DateTime<Utc>) -> StoreResult<u64> {
        self.check("deactivate_tenant_users")?;
        let mut count = 0;
        for user in self.working.users.iter_mut().filter(|u| u.tenant_id == tenant_id && u.active) {
            user.active = false;
            user.updated_at = now;
            count += 1;
        }
        Ok(count)
    }

    async fn any_operator_exists(&mut self) -> StoreResult<bool> {
        self.check("any_operator_exists")?;
        Ok(self.working.users.iter().any(|u| u.is_operator))
    }

    async fn user_stats(&mut self, tenant_id: Uuid) -> StoreResult<UserStats> {
        self.check("user_stats")?;
        let mut stats = UserStats::default();
        for user in self.working.users.iter().filter(|u| u.tenant_id == tenant_id && !u.is_operator) {
            stats.total += 1;
            if user.active {
                stats.active += 1;
            }
            stats.last_login_at = stats.last_login_at.max(user.last_login_at);
        }
        Ok(stats)
    }

    async fn user_stats_by_tenant(&mut self) -> StoreResult<HashMap<Uuid, UserStats>> {
        self.check("user_stats_by_tenant")?;
        let mut out: HashMap<Uuid, UserStats> = HashMap::new();
        for user in self.working.users.iter().filter(|u| !u.is_operator) {
            let stats = out.entry(user.tenant_id).or_default();
            stats.total += 1;
            if user.active {
                stats.active += 1;
            }
            stats.last_login_at = stats.last_login_at.max(user.last_login_at);
        }
        Ok(out)
    }

    async fn insert_role(&mut self, role: &Role) -> StoreResult<()> {
        self.check("insert_role")?;
        self.working.roles.push(role.clone());
        Ok(())
    }

    async fn attach_all_permissions(&mut self, role_id: Uuid) -> StoreResult<u64> {
        self.check("attach_all_permissions")?;
        let grants: Vec<(Uuid, String)> = self.working.permissions.iter().map(|p| (role_id, p.clone())).collect();
        let count = grants.len() as u64;
        self.working.grants.extend(grants);
        Ok(count)
    }

    async fn insert_categories(&mut self, categories: &[Category]) -> StoreResult<u64> {
        self.check("insert_categories")?;
        self.working.categories.extend_from_slice(categories);
        Ok(categories.len() as u64)
    }

    async fn insert_session(&mut self, session: &Session) -> StoreResult<()> {
        self.check("insert_session")?;
        self.working.sessions.push(session.clone());
        Ok(())
    }

    async fn delete_tenant_sessions(&mut self, tenant_id: Uuid) -> StoreResult<u64> {
        self.check("delete_tenant_sessions")?;
        let before = self.working.sessions.len();
        self.working.sessions.retain(|s| s.tenant_id != tenant_id);
        Ok((before - self.working.sessions.len()) as u64)
    }

    async fn count_live_sessions(&mut self, tenant_id: Uuid, now: DateTime<Utc>) -> StoreResult<i64> {
        self.check("count_live_sessions")?;
        Ok(self
            .working
            .sessions
            .iter()
            .filter(|s| s.tenant_id == tenant_id && s.expires_at > now)
            .count() as i64)
    }

    async fn find_license(&mut self, id: Uuid) -> StoreResult<Option<License>> {
        self.check("find_license")?;
        Ok(self.working.licenses.iter().find(|l| l.id == id).cloned())
    }

    async fn lock_license(&mut self, id: Uuid) -> StoreResult<Option<License>> {
        self.check("lock_license")?;
        Ok(self.working.licenses.iter().find(|l| l.id == id).cloned())
    }

    async fn lock_open_license(&mut self, tenant_id: Uuid) -> StoreResult<Option<License>> {
        self.check("lock_open_license")?;
        Ok(self.open_license_index(tenant_id).map(|i| self.working.licenses[i].clone()))
    }

    async fn license_history(&mut self, tenant_id: Uuid, limit: i64) -> StoreResult<Vec<License>> {
        self.check("license_history")?;
        let of_tenant: Vec<License> = self
            .working
            .licenses
            .iter()
            .filter(|l| l.tenant_id == tenant_id)
            .cloned()
            .collect();
        Ok(newest_first(&of_tenant, |l| l.created_at).into_iter().take(take(limit)).collect())
    }

    async fn latest_licenses(&mut self) -> StoreResult<Vec<License>> {
        self.check("latest_licenses")?;
        let mut seen = HashSet::new();
        Ok(newest_first(&self.working.licenses, |l| l.created_at)
            .into_iter()
            .filter(|l| seen.insert(l.tenant_id))
            .collect())
    }

    async fn list_licenses(&mut self, filter: &LicenseFilter) -> StoreResult<Vec<License>> {
        self.check("list_licenses")?;
        let matching: Vec<License> = self.working.licenses.iter().filter(|l| filter.matches(l)).cloned().collect();
        let limit = filter.limit.map(take).unwrap_or(usize::MAX);
        Ok(newest_first(&matching, |l| l.created_at).into_iter().take(limit).collect())
    }

    async fn supersede_open_licenses(&mut self, tenant_id: Uuid, now: DateTime<Utc>) -> StoreResult<u64> {
        self.check("supersede_open_licenses")?;
        let mut count = 0;
        for license in self.working.licenses.iter_mut().filter(|l| l.tenant_id == tenant_id && l.state.is_open()) {
            license.state = LicenseState::Superseded;
            license.updated_at = now;
            count += 1;
        }
        Ok(count)
    }

    async fn cancel_open_licenses(&mut self, tenant_id: Uuid, reason: &str, now: DateTime<Utc>) -> StoreResult<u64> {
        self.check("cancel_open_licenses")?;
        let mut count = 0;
        for license in self.working.licenses.iter_mut().filter(|l| l.tenant_id == tenant_id && l.state.is_open()) {
            license.state = LicenseState::Cancelled;
            license.change_reason = Some(reason.to_string());
            license.updated_at = now;
            count += 1;
        }
        Ok(count)
    }

    async fn insert_license(&mut self, license: &License) -> StoreResult<()> {
        self.check("insert_license")?;
        if license.state.is_open() && self.open_license_index(license.tenant_id).is_some() {
            return Err(DatabaseError::UniqueViolation("licenses_one_open_per_tenant".to_string()));
        }
        self.working.licenses.push(license.clone());
        Ok(())
    }

    async fn update_license(&mut self, license: &License) -> StoreResult<()> {
        self.check("update_license")?;
        if let Some(existing) = self.working.licenses.iter_mut().find(|l| l.id == license.id) {
            *existing = license.clone();
        }
        Ok(())
    }

    async fn expire_lapsed_licenses(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<License>> {
        self.check("expire_lapsed_licenses")?;
        let mut expired = Vec::new();
        for license in self.working.licenses.iter_mut() {
            let lapsed = license.ends_at.map_or(false, |end| end < now);
            if license.state.is_entitled() && lapsed {
                license.state = LicenseState::Expired;
                license.updated_at = now;
                expired.push(license.clone());
            }
        }
        Ok(expired)
    }

    async fn insert_audit(&mut self, record: &AuditRecord) -> StoreResult<()> {
        self.check("insert_audit")?;
        self.working.audit.push(record.clone());
        Ok(())
    }

    async fn list_audit(&mut self, tenant_id: Option<Uuid>, limit: i64) -> StoreResult<Vec<AuditRecord>> {
        self.check("list_audit")?;
        let matching: Vec<AuditRecord> = self
            .working
            .audit
            .iter()
            .filter(|r| tenant_id.map_or(true, |id| r.tenant_id == Some(id)))
            .cloned()
            .collect();
        Ok(newest_first(&matching, |r| r.created_at).into_iter().take(take(limit)).collect())
    }

    async fn insert_impersonation(&mut self, record: &ImpersonationRecord) -> StoreResult<bool> {
        self.check("insert_impersonation")?;
        if record.event.closes_session() && self.session_closed(record.session_id) {
            return Ok(false);
        }
        self.working.impersonations.push(record.clone());
        Ok(true)
    }

    async fn impersonation_events(&mut self, session_id: Uuid) -> StoreResult<Vec<ImpersonationRecord>> {
        self.check("impersonation_events")?;
        Ok(self
            .working
            .impersonations
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn list_impersonations(&mut self, tenant_id: Option<Uuid>, limit: i64) -> StoreResult<Vec<ImpersonationRecord>> {
        self.check("list_impersonations")?;
        let matching: Vec<ImpersonationRecord> = self
            .working
            .impersonations
            .iter()
            .filter(|r| tenant_id.map_or(true, |id| r.tenant_id == id))
            .cloned()
            .collect();
        Ok(newest_first(&matching, |r| r.created_at).into_iter().take(take(limit)).collect())
    }

    async fn lapsed_impersonations(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<ImpersonationRecord>> {
        self.check("lapsed_impersonations")?;
        Ok(self
            .working
            .impersonations
            .iter()
            .filter(|r| !r.event.closes_session() && r.expires_at < now)
            .filter(|r| !self.session_closed(r.session_id))
            .cloned()
            .collect())
    }

    async fn open_impersonations(&mut self, tenant_id: Uuid) -> StoreResult<Vec<ImpersonationRecord>> {
        self.check("open_impersonations")?;
        Ok(self
            .working
            .impersonations
            .iter()
            .filter(|r| r.tenant_id == tenant_id && !r.event.closes_session())
            .filter(|r| !self.session_closed(r.session_id))
            .cloned()
            .collect())
    }

    async fn current_plans(&mut self) -> StoreResult<Vec<PlanDefinition>> {
        self.check("current_plans")?;
        let mut current: HashMap<PlanTier, PlanDefinition> = HashMap::new();
        for plan in &self.working.plans {
            let newer = current.get(&plan.tier).map_or(true, |p| plan.version > p.version);
            if newer {
                current.insert(plan.tier, plan.clone());
            }
        }
        let mut plans: Vec<PlanDefinition> = current.into_values().collect();
        plans.sort_by_key(|p| p.tier);
        Ok(plans)
    }

    async fn current_plan(&mut self, tier: PlanTier) -> StoreResult<Option<PlanDefinition>> {
        self.check("current_plan")?;
        Ok(self
            .working
            .plans
            .iter()
            .filter(|p| p.tier == tier)
            .max_by_key(|p| p.version)
            .cloned())
    }

    async fn insert_plan(&mut self, plan: &PlanDefinition) -> StoreResult<()> {
        self.check("insert_plan")?;
        if self.working.plans.iter().any(|p| p.tier == plan.tier && p.version == plan.version) {
            return Err(DatabaseError::UniqueViolation("plan_definitions_pkey".to_string()));
        }
        self.working.plans.push(plan.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(tenant_id: Uuid) -> Session {
        let now = Utc::now();
        Session {
            id: Uuid::new_v4(),
            tenant_id,
            user_id: Uuid::new_v4(),
            created_at: now,
            expires_at: now + chrono::Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let store = MemoryStore::new();
        let tenant_id = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        tx.insert_session(&session(tenant_id)).await.unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.count_live_sessions(tenant_id, Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = MemoryStore::new();
        let tenant_id = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        tx.insert_session(&session(tenant_id)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.count_live_sessions(tenant_id, Utc::now()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn injected_failure_names_the_operation() {
        let store = MemoryStore::new();
        store.fail_operation("delete_tenant_sessions");

        let mut tx = store.begin().await.unwrap();
        let err = tx.delete_tenant_sessions(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Injected("delete_tenant_sessions")));

        store.clear_failures();
        assert_eq!(tx.delete_tenant_sessions(Uuid::new_v4()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn seeded_with_plans_and_system_tenant() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let plans = tx.current_plans().await.unwrap();
        assert_eq!(plans.iter().map(|p| p.tier).collect::<Vec<_>>(), PlanTier::ALL.to_vec());
        assert!(tx.find_tenant(SYSTEM_TENANT_ID).await.unwrap().is_some());
        assert!(tx.list_tenants(&TenantFilter::default()).await.unwrap().is_empty());
    }
}
