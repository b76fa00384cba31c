// handlers/public/mod.rs - Public handlers (no operator token required)
//
// Token acquisition, first-operator bootstrap, service info, and the
// impersonation end call made by the tenant-facing system with the
// impersonation token itself.

pub mod impersonate_end; // POST /admin/impersonate/end
pub mod login; // POST /admin/login
pub mod root; // GET / and GET /health
pub mod setup; // POST /admin/setup

pub use impersonate_end::impersonate_end;
pub use login::login;
pub use root::{health, root};
pub use setup::setup;
