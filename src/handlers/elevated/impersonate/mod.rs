// handlers/elevated/impersonate/mod.rs - Impersonation broker handlers
//
// Ending a session with the impersonation token is a public route, see
// handlers/public/impersonate_end.rs.

pub mod sessions; // GET /admin/impersonations, POST /admin/impersonations/:session_id/revoke
pub mod start; // POST /admin/impersonate

pub use sessions::{impersonation_history, impersonation_revoke};
pub use start::impersonate_start;
