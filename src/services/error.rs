use thiserror::Error;

use crate::auth::password::PasswordError;
use crate::auth::TokenError;
use crate::database::DatabaseError;
use crate::types::LicenseState;

/// Failures of control-plane operations, before HTTP mapping
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{message}")]
    Validation { field: &'static str, message: String },

    #[error("Tenant not found")]
    TenantNotFound,

    #[error("License not found")]
    LicenseNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Tenant has no owner account")]
    OwnerNotFound,

    #[error("Impersonation session not found")]
    SessionNotFound,

    #[error("Email '{0}' is already registered")]
    DuplicateEmail(String),

    #[error("Cannot {action} a license that is {from}")]
    InvalidTransition { action: &'static str, from: LicenseState },

    #[error("Confirmation text does not match")]
    ConfirmationMismatch,

    #[error("Operator password is incorrect")]
    WrongPassword,

    #[error("Tenant has been deleted")]
    TenantDeleted,

    #[error("Another change to this record was committed first; retry")]
    ConcurrentChange,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Database(DatabaseError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Token(#[from] TokenError),
}

impl From<DatabaseError> for ServiceError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::UniqueViolation(constraint) if constraint == "licenses_one_open_per_tenant" => {
                ServiceError::ConcurrentChange
            }
            other => ServiceError::Database(other),
        }
    }
}

impl ServiceError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        ServiceError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Stable machine-readable name, recorded in failure audits
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation { .. } => "validation",
            ServiceError::TenantNotFound => "tenant_not_found",
            ServiceError::LicenseNotFound => "license_not_found",
            ServiceError::UserNotFound => "user_not_found",
            ServiceError::OwnerNotFound => "owner_not_found",
            ServiceError::SessionNotFound => "session_not_found",
            ServiceError::DuplicateEmail(_) => "duplicate_email",
            ServiceError::InvalidTransition { .. } => "invalid_transition",
            ServiceError::ConfirmationMismatch => "confirmation_mismatch",
            ServiceError::WrongPassword => "wrong_password",
            ServiceError::TenantDeleted => "tenant_deleted",
            ServiceError::ConcurrentChange => "concurrent_change",
            ServiceError::InvalidCredentials => "invalid_credentials",
            ServiceError::Unauthorized(_) => "unauthorized",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::Database(_) => "internal",
            ServiceError::Password(_) => "internal",
            ServiceError::Token(_) => "internal",
        }
    }
}
