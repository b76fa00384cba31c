use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Feature, FeatureSet, PlanTier};

/// One version of a plan tier's commercial definition. The highest version is current.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDefinition {
    pub tier: PlanTier,
    pub version: i32,
    pub display_name: String,
    pub description: Option<String>,
    pub max_users: i32,
    pub max_tables: i32,
    pub duration_days: i32,
    pub annual_price: Decimal,
    pub features: FeatureSet,
    pub active: bool,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl PlanDefinition {
    /// Version 1 of each tier, as seeded by the initial migration.
    pub fn builtin(tier: PlanTier, created_at: DateTime<Utc>) -> Self {
        use Feature::*;

        let basic = [Orders, Tables, SimpleInvoicing, BasicReports];
        let professional = [ElectronicInvoicing, AdvancedReports, Inventory, Payroll];
        let enterprise = [AdvancedInventory, MultiBranch, ApiAccess];

        let (display_name, max_users, max_tables, price, features): (&str, i32, i32, i64, FeatureSet) = match tier {
            PlanTier::Basic => ("Basic", 5, 20, 500_000, basic.into_iter().collect()),
            PlanTier::Professional => (
                "Professional",
                15,
                50,
                600_000,
                basic.into_iter().chain(professional).collect(),
            ),
            PlanTier::Enterprise => (
                "Enterprise",
                100,
                500,
                1_200_000,
                basic.into_iter().chain(professional).chain(enterprise).collect(),
            ),
        };

        Self {
            tier,
            version: 1,
            display_name: display_name.to_string(),
            description: None,
            max_users,
            max_tables,
            duration_days: 365,
            annual_price: Decimal::from(price),
            features,
            active: true,
            updated_by: None,
            created_at,
        }
    }
}
