// handlers/elevated/mod.rs - Elevated handlers (operator token required)
//
// Every route here sits behind the operator gateway, which resolves the
// bearer token to an active operator account and injects `OperatorContext`.
// Handlers take the operator as an `Actor` so each write is attributed.
//
// Security Level: Operator JWT (audience "control-plane")
// Route Prefix: /admin/*

pub mod audit; // GET /admin/audit, GET /admin/audit/verify
pub mod dashboard; // GET /admin/dashboard
pub mod impersonate; // POST /admin/impersonate, /admin/impersonations*
pub mod license; // /admin/licenses*
pub mod me; // GET /admin/me, POST /admin/operators
pub mod plan; // /admin/plans*
pub mod tenant; // /admin/tenants*

pub use audit::{audit_recent, audit_verify};
pub use dashboard::dashboard;
pub use me::{me, operator_create};

/*
ROUTE MAP:

  Operators      GET /admin/me, POST /admin/operators, GET /admin/dashboard
  Tenants        POST/GET /admin/tenants, GET /admin/tenants-deleted,
                 GET /admin/tenants/:id, PATCH /admin/tenants/:id/status,
                 POST /admin/tenants/:id/{reset-password,change-email,toggle-lock,
                 logout-all,change-plan,delete}, GET /admin/tenants/:id/audit
  Licenses       POST/GET /admin/licenses, GET /admin/licenses/:id,
                 POST /admin/licenses/:id/{extend,pause,resume}
  Impersonation  POST /admin/impersonate, GET /admin/impersonations,
                 POST /admin/impersonations/:session_id/revoke
  Plans          GET /admin/plans, PUT /admin/plans/:tier
  Audit          GET /admin/audit, GET /admin/audit/verify

Tenant tokens never reach these handlers: the gateway rejects anything that
is not an operator token before routing.
*/
