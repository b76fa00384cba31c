pub mod audit_service;
pub mod error;
pub mod impersonation_service;
pub mod license_service;
pub mod license_state;
pub mod operator_service;
pub mod plan_service;
pub mod tenant_service;

pub use audit_service::{Actor, AuditService, AuditSigner, RequestOrigin};
pub use error::ServiceError;
pub use impersonation_service::ImpersonationBroker;
pub use license_service::LicenseService;
pub use operator_service::{OperatorContext, OperatorService};
pub use plan_service::PlanService;
pub use tenant_service::TenantService;
