// handlers/mod.rs - Two-tier handler architecture
//
// Public (no auth) → Elevated (operator token, via the operator gateway)
//
// Every elevated handler receives the authenticated operator as an `Actor`
// and passes it into the service call, so each audit write names the operator.

pub mod elevated; // Tier 2: operator gateway required (/admin/*)
pub mod public; // Tier 1: no authentication (/, /health, /admin/login, /admin/setup, /admin/impersonate/end)

use serde::Deserialize;

/// `?limit=` for paged trails
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}
