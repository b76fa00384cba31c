//! Transactional storage seam.
//!
//! Services open a `StoreTx` per operation and either `commit` it or drop it;
//! dropping rolls back. Both backends (`PgStore` and `MemoryStore`) give every
//! transaction all-or-nothing semantics, which the multi-step operations
//! (tenant creation, license supersede-then-insert, the delete cascade) rely on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use super::manager::DatabaseError;
use super::models::{
    AuditRecord, Category, ImpersonationRecord, License, LicenseFilter, PlanDefinition, Role, Session, Tenant,
    TenantDeletion, TenantFilter, User, UserStats,
};
use crate::types::{PlanTier, TenantStatus};

pub type StoreResult<T> = Result<T, DatabaseError>;

#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;

    async fn health_check(&self) -> StoreResult<()>;

    /// Short backend name for logs and the health endpoint
    fn backend(&self) -> &'static str;
}

#[async_trait]
pub trait StoreTx: Send {
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    // Tenants
    async fn find_tenant(&mut self, id: Uuid) -> StoreResult<Option<Tenant>>;
    /// Like `find_tenant`, holding a row lock until the transaction ends
    async fn lock_tenant(&mut self, id: Uuid) -> StoreResult<Option<Tenant>>;
    async fn slug_exists(&mut self, slug: &str) -> StoreResult<bool>;
    async fn insert_tenant(&mut self, tenant: &Tenant) -> StoreResult<()>;
    async fn list_tenants(&mut self, filter: &TenantFilter) -> StoreResult<Vec<Tenant>>;
    async fn update_tenant_status(&mut self, id: Uuid, status: TenantStatus, now: DateTime<Utc>) -> StoreResult<()>;
    async fn set_tenant_plan(&mut self, id: Uuid, plan: Option<PlanTier>, now: DateTime<Utc>) -> StoreResult<()>;
    async fn mark_tenant_deleted(&mut self, id: Uuid, deletion: &TenantDeletion) -> StoreResult<()>;

    // Users
    async fn find_user(&mut self, id: Uuid) -> StoreResult<Option<User>>;
    /// Case-insensitive lookup
    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>>;
    async fn insert_user(&mut self, user: &User) -> StoreResult<()>;
    /// Earliest non-operator user of the tenant
    async fn find_owner(&mut self, tenant_id: Uuid) -> StoreResult<Option<User>>;
    async fn set_password_hash(&mut self, user_id: Uuid, hash: &str, now: DateTime<Utc>) -> StoreResult<()>;
    async fn set_email(&mut self, user_id: Uuid, email: &str, now: DateTime<Utc>) -> StoreResult<()>;
    async fn set_locked(&mut self, user_id: Uuid, locked: bool, now: DateTime<Utc>) -> StoreResult<()>;
    async fn touch_last_login(&mut self, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<()>;
    async fn deactivate_tenant_users(&mut self, tenant_id: Uuid, now: DateTime<Utc>) -> StoreResult<u64>;
    async fn any_operator_exists(&mut self) -> StoreResult<bool>;
    async fn user_stats(&mut self, tenant_id: Uuid) -> StoreResult<UserStats>;
    async fn user_stats_by_tenant(&mut self) -> StoreResult<HashMap<Uuid, UserStats>>;

    // Roles and default catalog
    async fn insert_role(&mut self, role: &Role) -> StoreResult<()>;
    /// Grants every system permission to the role, returning how many were attached
    async fn attach_all_permissions(&mut self, role_id: Uuid) -> StoreResult<u64>;
    async fn insert_categories(&mut self, categories: &[Category]) -> StoreResult<u64>;

    // Sessions
    async fn insert_session(&mut self, session: &Session) -> StoreResult<()>;
    async fn delete_tenant_sessions(&mut self, tenant_id: Uuid) -> StoreResult<u64>;
    async fn count_live_sessions(&mut self, tenant_id: Uuid, now: DateTime<Utc>) -> StoreResult<i64>;

    // Licenses
    async fn find_license(&mut self, id: Uuid) -> StoreResult<Option<License>>;
    async fn lock_license(&mut self, id: Uuid) -> StoreResult<Option<License>>;
    /// The tenant's trial/active/paused license, locked
    async fn lock_open_license(&mut self, tenant_id: Uuid) -> StoreResult<Option<License>>;
    /// Newest first
    async fn license_history(&mut self, tenant_id: Uuid, limit: i64) -> StoreResult<Vec<License>>;
    /// Most recent license of every tenant
    async fn latest_licenses(&mut self) -> StoreResult<Vec<License>>;
    async fn list_licenses(&mut self, filter: &LicenseFilter) -> StoreResult<Vec<License>>;
    async fn supersede_open_licenses(&mut self, tenant_id: Uuid, now: DateTime<Utc>) -> StoreResult<u64>;
    async fn cancel_open_licenses(&mut self, tenant_id: Uuid, reason: &str, now: DateTime<Utc>) -> StoreResult<u64>;
    async fn insert_license(&mut self, license: &License) -> StoreResult<()>;
    /// Writes back every mutable column of an existing license
    async fn update_license(&mut self, license: &License) -> StoreResult<()>;
    /// Moves trial/active licenses whose end is before `now` to expired, returning them
    async fn expire_lapsed_licenses(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<License>>;

    // Audit log (append only)
    async fn insert_audit(&mut self, record: &AuditRecord) -> StoreResult<()>;
    /// Newest first
    async fn list_audit(&mut self, tenant_id: Option<Uuid>, limit: i64) -> StoreResult<Vec<AuditRecord>>;

    // Impersonation records
    /// Returns false, writing nothing, when a closing event already exists for the session
    async fn insert_impersonation(&mut self, record: &ImpersonationRecord) -> StoreResult<bool>;
    /// Oldest first
    async fn impersonation_events(&mut self, session_id: Uuid) -> StoreResult<Vec<ImpersonationRecord>>;
    /// Newest first
    async fn list_impersonations(&mut self, tenant_id: Option<Uuid>, limit: i64) -> StoreResult<Vec<ImpersonationRecord>>;
    /// `started` events with no closing event whose expiry is before `now`
    async fn lapsed_impersonations(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<ImpersonationRecord>>;
    /// `started` events of the tenant with no closing event, expired or not
    async fn open_impersonations(&mut self, tenant_id: Uuid) -> StoreResult<Vec<ImpersonationRecord>>;

    // Plan catalog
    async fn current_plans(&mut self) -> StoreResult<Vec<PlanDefinition>>;
    async fn current_plan(&mut self, tier: PlanTier) -> StoreResult<Option<PlanDefinition>>;
    async fn insert_plan(&mut self, plan: &PlanDefinition) -> StoreResult<()>;
}
