// handlers/elevated/tenant/mod.rs - Tenant administration handlers
//
// Onboarding, listing and detail, status changes, the owner support actions,
// plan changes and the guarded soft delete. Every mutation is attributed to
// the operator through `Actor` and audited inside its own transaction.

pub mod audit; // GET /admin/tenants/:id/audit
pub mod create; // POST /admin/tenants
pub mod delete; // POST /admin/tenants/:id/delete
pub mod list; // GET /admin/tenants, GET /admin/tenants-deleted
pub mod owner; // POST /admin/tenants/:id/{reset-password,change-email,toggle-lock,logout-all}
pub mod plan; // POST /admin/tenants/:id/change-plan
pub mod show; // GET /admin/tenants/:id
pub mod status; // PATCH /admin/tenants/:id/status

pub use audit::tenant_audit;
pub use create::tenant_create;
pub use delete::tenant_delete;
pub use list::{tenant_list, tenant_list_deleted};
pub use owner::{owner_change_email, owner_logout_all, owner_reset_password, owner_toggle_lock};
pub use plan::tenant_change_plan;
pub use show::tenant_show;
pub use status::tenant_status;
