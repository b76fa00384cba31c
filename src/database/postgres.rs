//! Postgres-backed `Store`.
//!
//! Enumerations are stored as text and decoded through `FromStr`; a value the
//! application does not know is reported as `DatabaseError::Decode` rather than
//! silently mapped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use super::manager::{DatabaseError, DatabaseManager};
use super::models::{
    AuditRecord, Category, ImpersonationRecord, License, LicenseFilter, PlanDefinition, Role, Session, Tenant,
    TenantDeletion, TenantFilter, User, UserStats,
};
use super::store::{Store, StoreResult, StoreTx};
use crate::types::{
    parse_plan_label, plan_label, FeatureSet, ParseEnumError, PlanTier, TenantStatus, SYSTEM_TENANT_ID,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn health_check(&self) -> StoreResult<()> {
        DatabaseManager::health_check(&self.pool).await
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

const TENANT_COLUMNS: &str = "id, name, slug, email, phone, address, plan, status, created_at, updated_at, \
     deleted_at, deleted_by, delete_reason, delete_detail";

const USER_COLUMNS: &str = "id, tenant_id, role_id, name, username, email, password_hash, active, locked, \
     is_operator, last_login_at, created_at, updated_at";

const LICENSE_COLUMNS: &str = "id, tenant_id, plan, state, starts_at, ends_at, paused_at, paused_days, \
     max_users, max_tables, features, notes, change_reason, created_by, created_at, updated_at";

const AUDIT_COLUMNS: &str = "id, action, operator_id, operator_email, tenant_id, user_id, details, origin_ip, \
     user_agent, digest, created_at";

const IMPERSONATION_COLUMNS: &str = "id, session_id, event, operator_id, operator_email, tenant_id, user_id, \
     origin_ip, user_agent, expires_at, metadata, created_at";

const PLAN_COLUMNS: &str = "tier, version, display_name, description, max_users, max_tables, duration_days, \
     annual_price, features, active, updated_by, created_at";

const OPEN_STATES: &str = "('trial', 'active', 'paused')";

#[derive(FromRow)]
struct TenantRow {
    id: Uuid,
    name: String,
    slug: String,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    plan: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    deleted_by: Option<Uuid>,
    delete_reason: Option<String>,
    delete_detail: Option<String>,
}

impl TryFrom<TenantRow> for Tenant {
    type Error = DatabaseError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        let bad = |e: ParseEnumError| DatabaseError::decode("tenants", e);
        Ok(Tenant {
            id: row.id,
            name: row.name,
            slug: row.slug,
            email: row.email,
            phone: row.phone,
            address: row.address,
            plan: parse_plan_label(&row.plan).map_err(bad)?,
            status: row.status.parse().map_err(bad)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
            deleted_by: row.deleted_by,
            delete_reason: row.delete_reason.map(|r| r.parse()).transpose().map_err(bad)?,
            delete_detail: row.delete_detail,
        })
    }
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    tenant_id: Uuid,
    role_id: Option<Uuid>,
    name: String,
    username: String,
    email: String,
    password_hash: String,
    active: bool,
    locked: bool,
    is_operator: bool,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            tenant_id: row.tenant_id,
            role_id: row.role_id,
            name: row.name,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            active: row.active,
            locked: row.locked,
            is_operator: row.is_operator,
            last_login_at: row.last_login_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct LicenseRow {
    id: Uuid,
    tenant_id: Uuid,
    plan: String,
    state: String,
    starts_at: DateTime<Utc>,
    ends_at: Option<DateTime<Utc>>,
    paused_at: Option<DateTime<Utc>>,
    paused_days: i32,
    max_users: i32,
    max_tables: i32,
    features: Json<FeatureSet>,
    notes: Option<String>,
    change_reason: Option<String>,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LicenseRow> for License {
    type Error = DatabaseError;

    fn try_from(row: LicenseRow) -> Result<Self, Self::Error> {
        let bad = |e: ParseEnumError| DatabaseError::decode("licenses", e);
        Ok(License {
            id: row.id,
            tenant_id: row.tenant_id,
            plan: row.plan.parse().map_err(bad)?,
            state: row.state.parse().map_err(bad)?,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            paused_at: row.paused_at,
            paused_days: row.paused_days,
            max_users: row.max_users,
            max_tables: row.max_tables,
            features: row.features.0,
            notes: row.notes,
            change_reason: row.change_reason,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct AuditRow {
    id: Uuid,
    action: String,
    operator_id: Option<Uuid>,
    operator_email: Option<String>,
    tenant_id: Option<Uuid>,
    user_id: Option<Uuid>,
    details: Value,
    origin_ip: Option<String>,
    user_agent: Option<String>,
    digest: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditRecord {
    type Error = DatabaseError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        Ok(AuditRecord {
            id: row.id,
            action: row.action.parse().map_err(|e| DatabaseError::decode("audit_log", e))?,
            operator_id: row.operator_id,
            operator_email: row.operator_email,
            tenant_id: row.tenant_id,
            user_id: row.user_id,
            details: row.details,
            origin_ip: row.origin_ip,
            user_agent: row.user_agent,
            digest: row.digest,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct ImpersonationRow {
    id: Uuid,
    session_id: Uuid,
    event: String,
    operator_id: Uuid,
    operator_email: String,
    tenant_id: Uuid,
    user_id: Uuid,
    origin_ip: Option<String>,
    user_agent: Option<String>,
    expires_at: DateTime<Utc>,
    metadata: Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<ImpersonationRow> for ImpersonationRecord {
    type Error = DatabaseError;

    fn try_from(row: ImpersonationRow) -> Result<Self, Self::Error> {
        Ok(ImpersonationRecord {
            id: row.id,
            session_id: row.session_id,
            event: row.event.parse().map_err(|e| DatabaseError::decode("impersonation_events", e))?,
            operator_id: row.operator_id,
            operator_email: row.operator_email,
            tenant_id: row.tenant_id,
            user_id: row.user_id,
            origin_ip: row.origin_ip,
            user_agent: row.user_agent,
            expires_at: row.expires_at,
            metadata: row.metadata,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct PlanRow {
    tier: String,
    version: i32,
    display_name: String,
    description: Option<String>,
    max_users: i32,
    max_tables: i32,
    duration_days: i32,
    annual_price: Decimal,
    features: Json<FeatureSet>,
    active: bool,
    updated_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PlanRow> for PlanDefinition {
    type Error = DatabaseError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        Ok(PlanDefinition {
            tier: row.tier.parse().map_err(|e| DatabaseError::decode("plan_definitions", e))?,
            version: row.version,
            display_name: row.display_name,
            description: row.description,
            max_users: row.max_users,
            max_tables: row.max_tables,
            duration_days: row.duration_days,
            annual_price: row.annual_price,
            features: row.features.0,
            active: row.active,
            updated_by: row.updated_by,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct UserStatsRow {
    tenant_id: Uuid,
    total: i64,
    active: i64,
    last_login_at: Option<DateTime<Utc>>,
}

fn decode_all<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = DatabaseError>,
{
    rows.into_iter().map(T::try_from).collect()
}

impl PgStoreTx {
    async fn tenant_where(&mut self, clause: &str, id: Uuid) -> StoreResult<Option<Tenant>> {
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE {clause}");
        let row = sqlx::query_as::<_, TenantRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Tenant::try_from).transpose()
    }

    async fn license_where(&mut self, clause: &str, id: Uuid) -> StoreResult<Option<License>> {
        let sql = format!("SELECT {LICENSE_COLUMNS} FROM licenses WHERE {clause}");
        let row = sqlx::query_as::<_, LicenseRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(License::try_from).transpose()
    }

    async fn user_where(&mut self, clause: &str, id: Uuid) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {clause}");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(User::from))
    }
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let this = *self;
        this.tx.commit().await?;
        Ok(())
    }

    async fn find_tenant(&mut self, id: Uuid) -> StoreResult<Option<Tenant>> {
        self.tenant_where("id = $1", id).await
    }

    async fn lock_tenant(&mut self, id: Uuid) -> StoreResult<Option<Tenant>> {
        self.tenant_where("id = $1 FOR UPDATE", id).await
    }

    async fn slug_exists(&mut self, slug: &str) -> StoreResult<bool> {
        let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM tenants WHERE slug = $1)")
            .bind(slug)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(exists)
    }

    async fn insert_tenant(&mut self, tenant: &Tenant) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO tenants (id, name, slug, email, phone, address, plan, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(tenant.id)
        .bind(&tenant.name)
        .bind(&tenant.slug)
        .bind(&tenant.email)
        .bind(&tenant.phone)
        .bind(&tenant.address)
        .bind(plan_label(tenant.plan))
        .bind(tenant.status.as_str())
        .bind(tenant.created_at)
        .bind(tenant.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn list_tenants(&mut self, filter: &TenantFilter) -> StoreResult<Vec<Tenant>> {
        let deleted_clause = if filter.deleted {
            "deleted_at IS NOT NULL"
        } else {
            "deleted_at IS NULL"
        };
        let sql = format!(
            "SELECT {TENANT_COLUMNS} FROM tenants \
             WHERE {deleted_clause} AND id <> $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, TenantRow>(&sql)
            .bind(SYSTEM_TENANT_ID)
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_all(&mut *self.tx)
            .await?;
        decode_all(rows)
    }

    async fn update_tenant_status(&mut self, id: Uuid, status: TenantStatus, now: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE tenants SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .bind(now)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn set_tenant_plan(&mut self, id: Uuid, plan: Option<PlanTier>, now: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE tenants SET plan = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(plan_label(plan))
            .bind(now)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn mark_tenant_deleted(&mut self, id: Uuid, deletion: &TenantDeletion) -> StoreResult<()> {
        sqlx::query(
            "UPDATE tenants SET status = 'deleted', deleted_at = $2, deleted_by = $3, delete_reason = $4, \
             delete_detail = $5, updated_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(deletion.deleted_at)
        .bind(deletion.deleted_by)
        .bind(deletion.reason.as_str())
        .bind(&deletion.detail)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_user(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        self.user_where("id = $1", id).await
    }

    async fn find_user_by_email(&mut self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(User::from))
    }

    async fn insert_user(&mut self, user: &User) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO users (id, tenant_id, role_id, name, username, email, password_hash, active, locked, \
             is_operator, last_login_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(user.id)
        .bind(user.tenant_id)
        .bind(user.role_id)
        .bind(&user.name)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.active)
        .bind(user.locked)
        .bind(user.is_operator)
        .bind(user.last_login_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_owner(&mut self, tenant_id: Uuid) -> StoreResult<Option<User>> {
        self.user_where(
            "tenant_id = $1 AND NOT is_operator ORDER BY created_at ASC LIMIT 1",
            tenant_id,
        )
        .await
    }

    async fn set_password_hash(&mut self, user_id: Uuid, hash: &str, now: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1")
            .bind(user_id)
            .bind(hash)
            .bind(now)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn set_email(&mut self, user_id: Uuid, email: &str, now: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE users SET email = $2, updated_at = $3 WHERE id = $1")
            .bind(user_id)
            .bind(email)
            .bind(now)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn set_locked(&mut self, user_id: Uuid, locked: bool, now: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE users SET locked = $2, updated_at = $3 WHERE id = $1")
            .bind(user_id)
            .bind(locked)
            .bind(now)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn touch_last_login(&mut self, user_id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE users SET last_login_at = $2 WHERE id = $1")
            .bind(user_id)
            .bind(now)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn deactivate_tenant_users(&mut self, tenant_id: Uuid, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("UPDATE users SET active = false, updated_at = $2 WHERE tenant_id = $1 AND active")
            .bind(tenant_id)
            .bind(now)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn any_operator_exists(&mut self) -> StoreResult<bool> {
        let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM users WHERE is_operator)")
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(exists)
    }

    async fn user_stats(&mut self, tenant_id: Uuid) -> StoreResult<UserStats> {
        let row = sqlx::query_as::<_, UserStatsRow>(
            "SELECT $1::uuid AS tenant_id, COUNT(*) AS total, COUNT(*) FILTER (WHERE active) AS active, \
             MAX(last_login_at) AS last_login_at \
             FROM users WHERE tenant_id = $1 AND NOT is_operator",
        )
        .bind(tenant_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(UserStats {
            total: row.total,
            active: row.active,
            last_login_at: row.last_login_at,
        })
    }

    async fn user_stats_by_tenant(&mut self) -> StoreResult<HashMap<Uuid, UserStats>> {
        let rows = sqlx::query_as::<_, UserStatsRow>(
            "SELECT tenant_id, COUNT(*) AS total, COUNT(*) FILTER (WHERE active) AS active, \
             MAX(last_login_at) AS last_login_at \
             FROM users WHERE NOT is_operator GROUP BY tenant_id",
        )
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                let stats = UserStats {
                    total: r.total,
                    active: r.active,
                    last_login_at: r.last_login_at,
                };
                (r.tenant_id, stats)
            })
            .collect())
    }

    async fn insert_role(&mut self, role: &Role) -> StoreResult<()> {
        sqlx::query("INSERT INTO roles (id, tenant_id, name, description, created_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(role.id)
            .bind(role.tenant_id)
            .bind(&role.name)
            .bind(&role.description)
            .bind(role.created_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn attach_all_permissions(&mut self, role_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("INSERT INTO role_permissions (role_id, permission) SELECT $1, code FROM permissions")
            .bind(role_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_categories(&mut self, categories: &[Category]) -> StoreResult<u64> {
        // One statement for the whole batch: all rows land or none do
        let result = sqlx::query(
            "INSERT INTO categories (id, tenant_id, name, position, created_at) \
             SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::text[], $4::int[], $5::timestamptz[])",
        )
        .bind(categories.iter().map(|c| c.id).collect::<Vec<_>>())
        .bind(categories.iter().map(|c| c.tenant_id).collect::<Vec<_>>())
        .bind(categories.iter().map(|c| c.name.clone()).collect::<Vec<_>>())
        .bind(categories.iter().map(|c| c.position).collect::<Vec<_>>())
        .bind(categories.iter().map(|c| c.created_at).collect::<Vec<_>>())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_session(&mut self, session: &Session) -> StoreResult<()> {
        sqlx::query("INSERT INTO sessions (id, tenant_id, user_id, created_at, expires_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(session.id)
            .bind(session.tenant_id)
            .bind(session.user_id)
            .bind(session.created_at)
            .bind(session.expires_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_tenant_sessions(&mut self, tenant_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE tenant_id = $1")
            .bind(tenant_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_live_sessions(&mut self, tenant_id: Uuid, now: DateTime<Utc>) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE tenant_id = $1 AND expires_at > $2")
            .bind(tenant_id)
            .bind(now)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count)
    }

    async fn find_license(&mut self, id: Uuid) -> StoreResult<Option<License>> {
        self.license_where("id = $1", id).await
    }

    async fn lock_license(&mut self, id: Uuid) -> StoreResult<Option<License>> {
        self.license_where("id = $1 FOR UPDATE", id).await
    }

    async fn lock_open_license(&mut self, tenant_id: Uuid) -> StoreResult<Option<License>> {
        let clause = format!("tenant_id = $1 AND state IN {OPEN_STATES} FOR UPDATE");
        self.license_where(&clause, tenant_id).await
    }

    async fn license_history(&mut self, tenant_id: Uuid, limit: i64) -> StoreResult<Vec<License>> {
        let sql = format!(
            "SELECT {LICENSE_COLUMNS} FROM licenses WHERE tenant_id = $1 ORDER BY created_at DESC, seq DESC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, LicenseRow>(&sql)
            .bind(tenant_id)
            .bind(limit)
            .fetch_all(&mut *self.tx)
            .await?;
        decode_all(rows)
    }

    async fn latest_licenses(&mut self) -> StoreResult<Vec<License>> {
        let sql = format!(
            "SELECT DISTINCT ON (tenant_id) {LICENSE_COLUMNS} FROM licenses \
             ORDER BY tenant_id, created_at DESC, seq DESC"
        );
        let rows = sqlx::query_as::<_, LicenseRow>(&sql).fetch_all(&mut *self.tx).await?;
        decode_all(rows)
    }

    async fn list_licenses(&mut self, filter: &LicenseFilter) -> StoreResult<Vec<License>> {
        let sql = format!(
            "SELECT {LICENSE_COLUMNS} FROM licenses \
             WHERE ($1::uuid IS NULL OR tenant_id = $1) \
               AND ($2::text IS NULL OR state = $2) \
               AND ($3::text IS NULL OR plan = $3) \
             ORDER BY created_at DESC, seq DESC \
             LIMIT $4"
        );
        let rows = sqlx::query_as::<_, LicenseRow>(&sql)
            .bind(filter.tenant_id)
            .bind(filter.state.map(|s| s.as_str()))
            .bind(filter.plan.map(|p| p.as_str()))
            .bind(filter.limit)
            .fetch_all(&mut *self.tx)
            .await?;
        decode_all(rows)
    }

    async fn supersede_open_licenses(&mut self, tenant_id: Uuid, now: DateTime<Utc>) -> StoreResult<u64> {
        let sql = format!(
            "UPDATE licenses SET state = 'superseded', updated_at = $2 WHERE tenant_id = $1 AND state IN {OPEN_STATES}"
        );
        let result = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(now)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn cancel_open_licenses(&mut self, tenant_id: Uuid, reason: &str, now: DateTime<Utc>) -> StoreResult<u64> {
        let sql = format!(
            "UPDATE licenses SET state = 'cancelled', change_reason = $2, updated_at = $3 \
             WHERE tenant_id = $1 AND state IN {OPEN_STATES}"
        );
        let result = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(reason)
            .bind(now)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_license(&mut self, license: &License) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO licenses (id, tenant_id, plan, state, starts_at, ends_at, paused_at, paused_days, \
             max_users, max_tables, features, notes, change_reason, created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(license.id)
        .bind(license.tenant_id)
        .bind(license.plan.as_str())
        .bind(license.state.as_str())
        .bind(license.starts_at)
        .bind(license.ends_at)
        .bind(license.paused_at)
        .bind(license.paused_days)
        .bind(license.max_users)
        .bind(license.max_tables)
        .bind(Json(&license.features))
        .bind(&license.notes)
        .bind(&license.change_reason)
        .bind(license.created_by)
        .bind(license.created_at)
        .bind(license.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_license(&mut self, license: &License) -> StoreResult<()> {
        sqlx::query(
            "UPDATE licenses SET plan = $2, state = $3, ends_at = $4, paused_at = $5, paused_days = $6, \
             max_users = $7, max_tables = $8, features = $9, notes = $10, change_reason = $11, updated_at = $12 \
             WHERE id = $1",
        )
        .bind(license.id)
        .bind(license.plan.as_str())
        .bind(license.state.as_str())
        .bind(license.ends_at)
        .bind(license.paused_at)
        .bind(license.paused_days)
        .bind(license.max_users)
        .bind(license.max_tables)
        .bind(Json(&license.features))
        .bind(&license.notes)
        .bind(&license.change_reason)
        .bind(license.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn expire_lapsed_licenses(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<License>> {
        let sql = format!(
            "UPDATE licenses SET state = 'expired', updated_at = $1 \
             WHERE state IN ('trial', 'active') AND ends_at < $1 \
             RETURNING {LICENSE_COLUMNS}"
        );
        let rows = sqlx::query_as::<_, LicenseRow>(&sql)
            .bind(now)
            .fetch_all(&mut *self.tx)
            .await?;
        decode_all(rows)
    }

    async fn insert_audit(&mut self, record: &AuditRecord) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO audit_log (id, action, operator_id, operator_email, tenant_id, user_id, details, \
             origin_ip, user_agent, digest, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(record.id)
        .bind(record.action.as_str())
        .bind(record.operator_id)
        .bind(&record.operator_email)
        .bind(record.tenant_id)
        .bind(record.user_id)
        .bind(&record.details)
        .bind(&record.origin_ip)
        .bind(&record.user_agent)
        .bind(&record.digest)
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn list_audit(&mut self, tenant_id: Option<Uuid>, limit: i64) -> StoreResult<Vec<AuditRecord>> {
        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log WHERE ($1::uuid IS NULL OR tenant_id = $1) \
             ORDER BY created_at DESC, seq DESC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, AuditRow>(&sql)
            .bind(tenant_id)
            .bind(limit)
            .fetch_all(&mut *self.tx)
            .await?;
        decode_all(rows)
    }

    async fn insert_impersonation(&mut self, record: &ImpersonationRecord) -> StoreResult<bool> {
        // The partial unique index on closing events turns a second close into a no-op
        let result = sqlx::query(
            "INSERT INTO impersonation_events (id, session_id, event, operator_id, operator_email, tenant_id, \
             user_id, origin_ip, user_agent, expires_at, metadata, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT DO NOTHING",
        )
        .bind(record.id)
        .bind(record.session_id)
        .bind(record.event.as_str())
        .bind(record.operator_id)
        .bind(&record.operator_email)
        .bind(record.tenant_id)
        .bind(record.user_id)
        .bind(&record.origin_ip)
        .bind(&record.user_agent)
        .bind(record.expires_at)
        .bind(&record.metadata)
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn impersonation_events(&mut self, session_id: Uuid) -> StoreResult<Vec<ImpersonationRecord>> {
        let sql = format!(
            "SELECT {IMPERSONATION_COLUMNS} FROM impersonation_events WHERE session_id = $1 ORDER BY created_at, seq"
        );
        let rows = sqlx::query_as::<_, ImpersonationRow>(&sql)
            .bind(session_id)
            .fetch_all(&mut *self.tx)
            .await?;
        decode_all(rows)
    }

    async fn list_impersonations(&mut self, tenant_id: Option<Uuid>, limit: i64) -> StoreResult<Vec<ImpersonationRecord>> {
        let sql = format!(
            "SELECT {IMPERSONATION_COLUMNS} FROM impersonation_events WHERE ($1::uuid IS NULL OR tenant_id = $1) \
             ORDER BY created_at DESC, seq DESC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, ImpersonationRow>(&sql)
            .bind(tenant_id)
            .bind(limit)
            .fetch_all(&mut *self.tx)
            .await?;
        decode_all(rows)
    }

    async fn lapsed_impersonations(&mut self, now: DateTime<Utc>) -> StoreResult<Vec<ImpersonationRecord>> {
        let sql = format!(
            "SELECT {IMPERSONATION_COLUMNS} FROM impersonation_events s \
             WHERE s.event = 'started' AND s.expires_at < $1 \
               AND NOT EXISTS ( \
                 SELECT 1 FROM impersonation_events c \
                 WHERE c.session_id = s.session_id AND c.event IN ('ended', 'expired')) \
             ORDER BY s.created_at"
        );
        let rows = sqlx::query_as::<_, ImpersonationRow>(&sql)
            .bind(now)
            .fetch_all(&mut *self.tx)
            .await?;
        decode_all(rows)
    }

    async fn open_impersonations(&mut self, tenant_id: Uuid) -> StoreResult<Vec<ImpersonationRecord>> {
        let sql = format!(
            "SELECT {IMPERSONATION_COLUMNS} FROM impersonation_events s \
             WHERE s.event = 'started' AND s.tenant_id = $1 \
               AND NOT EXISTS ( \
                 SELECT 1 FROM impersonation_events c \
                 WHERE c.session_id = s.session_id AND c.event IN ('ended', 'expired')) \
             ORDER BY s.created_at"
        );
        let rows = sqlx::query_as::<_, ImpersonationRow>(&sql)
            .bind(tenant_id)
            .fetch_all(&mut *self.tx)
            .await?;
        decode_all(rows)
    }

    async fn current_plans(&mut self) -> StoreResult<Vec<PlanDefinition>> {
        let sql = format!(
            "SELECT DISTINCT ON (tier) {PLAN_COLUMNS} FROM plan_definitions ORDER BY tier, version DESC"
        );
        let rows = sqlx::query_as::<_, PlanRow>(&sql).fetch_all(&mut *self.tx).await?;
        let mut plans: Vec<PlanDefinition> = decode_all(rows)?;
        plans.sort_by_key(|p| p.tier);
        Ok(plans)
    }

    async fn current_plan(&mut self, tier: PlanTier) -> StoreResult<Option<PlanDefinition>> {
        let sql = format!(
            "SELECT {PLAN_COLUMNS} FROM plan_definitions WHERE tier = $1 ORDER BY version DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, PlanRow>(&sql)
            .bind(tier.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(PlanDefinition::try_from).transpose()
    }

    async fn insert_plan(&mut self, plan: &PlanDefinition) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO plan_definitions (tier, version, display_name, description, max_users, max_tables, \
             duration_days, annual_price, features, active, updated_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(plan.tier.as_str())
        .bind(plan.version)
        .bind(&plan.display_name)
        .bind(&plan.description)
        .bind(plan.max_users)
        .bind(plan.max_tables)
        .bind(plan.duration_days)
        .bind(plan.annual_price)
        .bind(Json(&plan.features))
        .bind(plan.active)
        .bind(plan.updated_by)
        .bind(plan.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}
