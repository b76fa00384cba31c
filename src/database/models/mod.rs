pub mod audit;
pub mod impersonation;
pub mod license;
pub mod plan;
pub mod role;
pub mod session;
pub mod tenant;
pub mod user;

pub use audit::AuditRecord;
pub use impersonation::{ClosedBy, ImpersonationRecord};
pub use license::{License, LicenseFilter};
pub use plan::PlanDefinition;
pub use role::{Category, Role, SYSTEM_PERMISSIONS};
pub use session::Session;
pub use tenant::{Tenant, TenantDeletion, TenantFilter};
pub use user::{User, UserStats};
