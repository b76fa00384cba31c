use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Permission codes granted to a new tenant's administrator role.
/// Must stay in step with the rows seeded by the initial migration.
pub const SYSTEM_PERMISSIONS: &[&str] = &[
    "create_orders",
    "manage_cash_register",
    "view_reports",
    "view_history",
    "manage_menu",
    "manage_spaces",
    "manage_system",
    "payroll.manage",
];

pub const ADMINISTRATOR_ROLE: &str = "Administrator";

pub const DEFAULT_CATEGORIES: &[&str] = &["Main Courses", "Drinks", "Starters", "Desserts"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}
