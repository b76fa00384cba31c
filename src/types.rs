//! Shared domain vocabulary used across storage, services and handlers.
//!
//! Every enum here is persisted as lowercase snake_case text, so the
//! `as_str`/`FromStr` pair is the single source of truth for both the
//! database columns and the JSON wire format.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Tenant that owns operator accounts. Never listed alongside customer tenants.
pub const SYSTEM_TENANT_ID: Uuid = Uuid::nil();

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident as $kind:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

text_enum! {
    /// Lifecycle status of a tenant
    TenantStatus as "tenant status" {
        Active => "active",
        Suspended => "suspended",
        Deleted => "deleted",
    }
}

text_enum! {
    /// States of a license row. `expired`, `superseded` and `cancelled` are terminal.
    LicenseState as "license state" {
        Trial => "trial",
        Active => "active",
        Paused => "paused",
        Expired => "expired",
        Superseded => "superseded",
        Cancelled => "cancelled",
    }
}

impl LicenseState {
    /// States that count against the one-open-license-per-tenant rule.
    pub const OPEN: [LicenseState; 3] = [LicenseState::Trial, LicenseState::Active, LicenseState::Paused];

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }

    /// Trial and active grant the tenant access; they differ only in presentation.
    pub fn is_entitled(&self) -> bool {
        matches!(self, LicenseState::Trial | LicenseState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }
}

text_enum! {
    /// Commercial plan tiers
    PlanTier as "plan" {
        Basic => "basic",
        Professional => "professional",
        Enterprise => "enterprise",
    }
}

/// Stored label for tenants that have never held a plan.
pub const NO_PLAN: &str = "none";

pub fn plan_label(plan: Option<PlanTier>) -> &'static str {
    plan.map(|p| p.as_str()).unwrap_or(NO_PLAN)
}

pub fn parse_plan_label(value: &str) -> Result<Option<PlanTier>, ParseEnumError> {
    if value == NO_PLAN {
        Ok(None)
    } else {
        value.parse().map(Some)
    }
}

/// Serde adapter writing `Option<PlanTier>` as a label, `none` included.
pub mod plan_label_serde {
    use super::{parse_plan_label, plan_label, PlanTier};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(plan: &Option<PlanTier>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(plan_label(*plan))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<PlanTier>, D::Error> {
        let value = String::deserialize(deserializer)?;
        parse_plan_label(&value).map_err(serde::de::Error::custom)
    }
}

text_enum! {
    /// Capabilities a license can grant
    Feature as "feature" {
        Orders => "orders",
        Tables => "tables",
        SimpleInvoicing => "simple_invoicing",
        ElectronicInvoicing => "electronic_invoicing",
        BasicReports => "basic_reports",
        AdvancedReports => "advanced_reports",
        Inventory => "inventory",
        AdvancedInventory => "advanced_inventory",
        Payroll => "payroll",
        MultiBranch => "multi_branch",
        ApiAccess => "api_access",
    }
}

pub type FeatureSet = BTreeSet<Feature>;

text_enum! {
    /// Kinds of privileged action recorded in the audit log
    AuditAction as "audit action" {
        TenantCreated => "tenant_created",
        TenantSuspended => "tenant_suspended",
        TenantActivated => "tenant_activated",
        TenantDeleted => "tenant_deleted",
        TenantDeleteFailed => "tenant_delete_failed",
        LicenseIssued => "license_issued",
        LicenseExtended => "license_extended",
        LicensePaused => "license_paused",
        LicenseResumed => "license_resumed",
        PlanChanged => "plan_changed",
        PlanUpdated => "plan_updated",
        OwnerPasswordReset => "owner_password_reset",
        OwnerEmailChanged => "owner_email_changed",
        OwnerLocked => "owner_locked",
        OwnerUnlocked => "owner_unlocked",
        SessionsRevoked => "sessions_revoked",
        OperatorCreated => "operator_created",
    }
}

text_enum! {
    /// Why a tenant was deleted. `Other` must come with a written explanation.
    DeleteReason as "delete reason" {
        CustomerRequest => "customer_request",
        NonPayment => "non_payment",
        TermsViolation => "terms_violation",
        FraudDetected => "fraud_detected",
        DuplicateTenant => "duplicate_tenant",
        BusinessClosed => "business_closed",
        Other => "other",
    }
}

text_enum! {
    /// Events in the life of one impersonation session
    ImpersonationEvent as "impersonation event" {
        Started => "started",
        Ended => "ended",
        Expired => "expired",
    }
}

impl ImpersonationEvent {
    pub fn closes_session(&self) -> bool {
        !matches!(self, ImpersonationEvent::Started)
    }
}
