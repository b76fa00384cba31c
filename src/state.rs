use anyhow::Context;
use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::TokenService;
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::database::{DatabaseManager, MemoryStore, PgStore, Store};
use crate::services::{
    AuditService, AuditSigner, ImpersonationBroker, LicenseService, OperatorService, PlanService, ServiceError,
    TenantService,
};

/// Shared handles passed to every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub tokens: Arc<TokenService>,
    pub audit: Arc<AuditService>,
    pub licenses: Arc<LicenseService>,
    pub tenants: Arc<TenantService>,
    pub operators: Arc<OperatorService>,
    pub impersonation: Arc<ImpersonationBroker>,
    pub plans: Arc<PlanService>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SweepReport {
    pub licenses_expired: usize,
    pub sessions_closed: usize,
}

impl AppState {
    pub fn new(config: &AppConfig, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let tokens = Arc::new(TokenService::new(
            config.security.jwt_secret.as_bytes(),
            clock.clone(),
            Duration::hours(config.security.operator_token_hours),
            Duration::minutes(config.security.impersonation_token_minutes),
        ));
        let signer = AuditSigner::new(config.audit_signing_key()).context("invalid audit signing key")?;
        let audit = Arc::new(AuditService::new(
            store.clone(),
            clock.clone(),
            signer,
            config.api.default_audit_limit,
            config.api.max_audit_limit,
        ));

        Ok(Self {
            licenses: Arc::new(LicenseService::new(store.clone(), clock.clone(), audit.clone())),
            tenants: Arc::new(TenantService::new(
                store.clone(),
                clock.clone(),
                audit.clone(),
                config.security.bcrypt_cost,
                config.licensing.expiring_soon_days,
            )),
            operators: Arc::new(OperatorService::new(
                store.clone(),
                clock.clone(),
                tokens.clone(),
                audit.clone(),
                config.security.bcrypt_cost,
                config.security.allow_operator_setup,
            )),
            impersonation: Arc::new(ImpersonationBroker::new(
                store.clone(),
                clock.clone(),
                tokens.clone(),
                audit.clone(),
            )),
            plans: Arc::new(PlanService::new(store.clone(), clock.clone(), audit.clone())),
            store,
            clock,
            tokens,
            audit,
        })
    }

    /// One pass of scheduled work: expire lapsed licenses, then close lapsed impersonation sessions
    pub async fn sweep(&self) -> Result<SweepReport, ServiceError> {
        let expired = self.licenses.expire_sweep().await?;
        let closed = self.impersonation.close_lapsed().await?;
        Ok(SweepReport {
            licenses_expired: expired.len(),
            sessions_closed: closed.len(),
        })
    }
}

/// Postgres when `DATABASE_URL` is set; otherwise the in-memory store, which
/// `AppConfig::validate` only permits in development.
pub async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn Store>> {
    match &config.database.url {
        Some(_) => {
            let pool = DatabaseManager::connect(&config.database)
                .await
                .context("failed to connect to the database")?;
            if config.database.run_migrations {
                DatabaseManager::migrate(&pool).await.context("failed to apply migrations")?;
            }
            Ok(Arc::new(PgStore::new(pool)))
        }
        None => {
            warn!("DATABASE_URL not set; using the in-memory store (data is lost on exit)");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").field("store", &self.store.backend()).finish_non_exhaustive()
    }
}

pub(crate) fn log_sweep(report: &SweepReport) {
    if report.licenses_expired > 0 || report.sessions_closed > 0 {
        info!(
            "Sweep expired {} license(s) and closed {} impersonation session(s)",
            report.licenses_expired, report.sessions_closed
        );
    }
}
