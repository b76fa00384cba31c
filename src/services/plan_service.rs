use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use super::audit_service::{Actor, AuditService};
use super::error::ServiceError;
use super::license_state::MAX_TERM_DAYS;
use crate::clock::Clock;
use crate::database::models::PlanDefinition;
use crate::database::{DatabaseError, Store};
use crate::types::{AuditAction, PlanTier};

/// Fields an operator may change. Features stay fixed per tier.
#[derive(Debug, Clone, Default)]
pub struct UpdatePlan {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub max_users: Option<i32>,
    pub max_tables: Option<i32>,
    pub duration_days: Option<i32>,
    pub annual_price: Option<Decimal>,
    pub active: Option<bool>,
}

impl UpdatePlan {
    fn apply(self, plan: &mut PlanDefinition) -> Result<(), ServiceError> {
        if let Some(name) = self.display_name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ServiceError::validation("displayName", "Display name cannot be empty"));
            }
            plan.display_name = name;
        }
        if let Some(description) = self.description {
            plan.description = Some(description.trim().to_string()).filter(|d| !d.is_empty());
        }
        if let Some(max_users) = self.max_users {
            if max_users < 1 {
                return Err(ServiceError::validation("maxUsers", "At least one user must be allowed"));
            }
            plan.max_users = max_users;
        }
        if let Some(max_tables) = self.max_tables {
            if max_tables < 0 {
                return Err(ServiceError::validation("maxTables", "Table limit cannot be negative"));
            }
            plan.max_tables = max_tables;
        }
        if let Some(days) = self.duration_days {
            if days < 1 {
                return Err(ServiceError::validation("durationDays", "Duration must be at least one day"));
            }
            if i64::from(days) > MAX_TERM_DAYS {
                return Err(ServiceError::validation(
                    "durationDays",
                    format!("Duration cannot exceed {} days", MAX_TERM_DAYS),
                ));
            }
            plan.duration_days = days;
        }
        if let Some(price) = self.annual_price {
            if price.is_sign_negative() {
                return Err(ServiceError::validation("annualPrice", "Price cannot be negative"));
            }
            plan.annual_price = price.round_dp(2);
        }
        if let Some(active) = self.active {
            plan.active = active;
        }
        Ok(())
    }
}

/// Versioned plan catalog. Updates insert a new version; older versions stay as history.
pub struct PlanService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    audit: Arc<AuditService>,
}

impl PlanService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, audit: Arc<AuditService>) -> Self {
        Self { store, clock, audit }
    }

    pub async fn list(&self) -> Result<Vec<PlanDefinition>, ServiceError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.current_plans().await?)
    }

    pub async fn update(&self, actor: &Actor, tier: PlanTier, changes: UpdatePlan) -> Result<PlanDefinition, ServiceError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let current = match tx.current_plan(tier).await? {
            Some(plan) => plan,
            None => PlanDefinition::builtin(tier, now),
        };
        let mut next = current.clone();
        changes.apply(&mut next)?;
        next.version = current.version + 1;
        next.updated_by = actor.operator_id;
        next.created_at = now;

        tx.insert_plan(&next).await.map_err(|e| match e {
            DatabaseError::UniqueViolation(_) => ServiceError::ConcurrentChange,
            other => other.into(),
        })?;

        self.audit
            .record(
                tx.as_mut(),
                actor,
                AuditAction::PlanUpdated,
                None,
                None,
                json!({
                    "tier": tier,
                    "version": next.version,
                    "previous": {
                        "max_users": current.max_users,
                        "max_tables": current.max_tables,
                        "duration_days": current.duration_days,
                        "annual_price": current.annual_price,
                        "active": current.active,
                    },
                    "current": {
                        "max_users": next.max_users,
                        "max_tables": next.max_tables,
                        "duration_days": next.duration_days,
                        "annual_price": next.annual_price,
                        "active": next.active,
                    },
                }),
            )
            .await?;
        tx.commit().await?;

        info!("{} published {} plan version {}", actor.label(), tier, next.version);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn update_validates_before_changing_anything() {
        let mut plan = PlanDefinition::builtin(PlanTier::Basic, Utc::now());
        let changes = UpdatePlan {
            max_users: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            changes.apply(&mut plan),
            Err(ServiceError::Validation { field: "maxUsers", .. })
        ));

        let changes = UpdatePlan {
            max_users: Some(8),
            annual_price: Some(Decimal::new(55_000_075, 2)),
            ..Default::default()
        };
        changes.apply(&mut plan).unwrap();
        assert_eq!(plan.max_users, 8);

        let changes = UpdatePlan {
            duration_days: Some(i32::MAX),
            ..Default::default()
        };
        assert!(matches!(
            changes.apply(&mut plan),
            Err(ServiceError::Validation { field: "durationDays", .. })
        ));
        assert_eq!(plan.annual_price, Decimal::new(55_000_075, 2));
    }
}
