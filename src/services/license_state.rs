//! License state machine.
//!
//! Pure transition functions over `License`; the service layer wraps each in a
//! transaction with its audit record. Day arithmetic is done in UTC on exact
//! instants, rounding partial days up.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::error::ServiceError;
use crate::database::models::{License, PlanDefinition};
use crate::types::LicenseState;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Upper bound for a single issue or extension, in days
pub const MAX_TERM_DAYS: i64 = 3_650;

/// Ceiling of a span in whole days. Negative spans round toward zero,
/// so a license that lapsed 1.5 days ago reports -1.
pub fn ceil_days(span: Duration) -> i64 {
    let ms = span.num_milliseconds();
    ms.div_euclid(MILLIS_PER_DAY) + i64::from(ms.rem_euclid(MILLIS_PER_DAY) > 0)
}

/// `base + days`, rejecting terms outside `1..=MAX_TERM_DAYS` and dates chrono cannot represent
pub fn add_days(base: DateTime<Utc>, days: i64, field: &'static str) -> Result<DateTime<Utc>, ServiceError> {
    if days <= 0 {
        return Err(ServiceError::validation(field, "Must be at least one day"));
    }
    if days > MAX_TERM_DAYS {
        return Err(ServiceError::validation(
            field,
            format!("Cannot exceed {} days", MAX_TERM_DAYS),
        ));
    }
    Duration::try_days(days)
        .and_then(|span| base.checked_add_signed(span))
        .ok_or_else(|| ServiceError::validation(field, "Resulting date is out of range"))
}

pub fn days_remaining(ends_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<i64> {
    ends_at.map(|end| ceil_days(end - now))
}

/// Parameters of a newly issued license
#[derive(Debug, Clone)]
pub struct Issue {
    pub tenant_id: Uuid,
    pub duration_days: i64,
    pub is_trial: bool,
    pub max_users: Option<i32>,
    pub max_tables: Option<i32>,
    pub notes: Option<String>,
    pub issued_by: Option<Uuid>,
}

/// Builds the new license row. The caller supersedes the previous open license first.
pub fn issue(params: Issue, plan: &PlanDefinition, now: DateTime<Utc>) -> Result<License, ServiceError> {
    let ends_at = add_days(now, params.duration_days, "durationDays")?;
    if params.max_users.is_some_and(|n| n < 1) {
        return Err(ServiceError::validation("maxUsers", "At least one user must be allowed"));
    }
    if params.max_tables.is_some_and(|n| n < 0) {
        return Err(ServiceError::validation("maxTables", "Table limit cannot be negative"));
    }

    Ok(License {
        id: Uuid::new_v4(),
        tenant_id: params.tenant_id,
        plan: plan.tier,
        state: if params.is_trial {
            LicenseState::Trial
        } else {
            LicenseState::Active
        },
        starts_at: now,
        ends_at: Some(ends_at),
        paused_at: None,
        paused_days: 0,
        max_users: params.max_users.unwrap_or(plan.max_users),
        max_tables: params.max_tables.unwrap_or(plan.max_tables),
        features: plan.features.clone(),
        notes: params.notes,
        change_reason: None,
        created_by: params.issued_by,
        created_at: now,
        updated_at: now,
    })
}

/// `end = max(end, now) + days`. A paused license's clock is stopped, so it cannot be extended.
pub fn extend(license: &mut License, days: i64, reason: Option<String>, now: DateTime<Utc>) -> Result<(), ServiceError> {
    if !license.state.is_entitled() {
        return Err(ServiceError::InvalidTransition {
            action: "extend",
            from: license.state,
        });
    }

    let base = license.ends_at.map_or(now, |end| end.max(now));
    license.ends_at = Some(add_days(base, days, "days")?);
    license.change_reason = reason;
    license.updated_at = now;
    Ok(())
}

pub fn pause(license: &mut License, reason: String, now: DateTime<Utc>) -> Result<(), ServiceError> {
    if !license.state.is_entitled() {
        return Err(ServiceError::InvalidTransition {
            action: "pause",
            from: license.state,
        });
    }

    license.state = LicenseState::Paused;
    license.paused_at = Some(now);
    license.change_reason = Some(reason);
    license.updated_at = now;
    Ok(())
}

/// Credits the whole paused span back to the license. Returns the days credited.
pub fn resume(license: &mut License, now: DateTime<Utc>) -> Result<i64, ServiceError> {
    let paused_at = match (license.state, license.paused_at) {
        (LicenseState::Paused, Some(at)) => at,
        (from, _) => {
            return Err(ServiceError::InvalidTransition { action: "resume", from });
        }
    };

    let elapsed = ceil_days(now - paused_at).max(0);
    license.ends_at = license.ends_at.map(|end| end + Duration::days(elapsed));
    license.paused_days += i32::try_from(elapsed).unwrap_or(i32::MAX);
    license.paused_at = None;
    license.state = LicenseState::Active;
    license.updated_at = now;
    Ok(elapsed)
}

/// Swaps plan, caps and features for the plan's current defaults. State and dates are untouched.
pub fn apply_plan(license: &mut License, plan: &PlanDefinition, reason: Option<String>, now: DateTime<Utc>) {
    license.plan = plan.tier;
    license.max_users = plan.max_users;
    license.max_tables = plan.max_tables;
    license.features = plan.features.clone();
    license.change_reason = reason;
    license.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlanTier;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn active(days: i64) -> License {
        let plan = PlanDefinition::builtin(PlanTier::Basic, t0());
        issue(
            Issue {
                tenant_id: Uuid::new_v4(),
                duration_days: days,
                is_trial: false,
                max_users: None,
                max_tables: None,
                notes: None,
                issued_by: Some(Uuid::new_v4()),
            },
            &plan,
            t0(),
        )
        .unwrap()
    }

    #[test]
    fn ceil_days_rounds_partial_days_up() {
        assert_eq!(ceil_days(Duration::zero()), 0);
        assert_eq!(ceil_days(Duration::seconds(1)), 1);
        assert_eq!(ceil_days(Duration::days(30)), 30);
        assert_eq!(ceil_days(Duration::days(30) + Duration::minutes(1)), 31);
        assert_eq!(ceil_days(Duration::hours(-36)), -1);
    }

    #[test]
    fn issue_uses_plan_defaults_unless_overridden() {
        let license = active(30);
        assert_eq!(license.state, LicenseState::Active);
        assert_eq!(license.max_users, 5);
        assert_eq!(days_remaining(license.ends_at, t0()), Some(30));

        let plan = PlanDefinition::builtin(PlanTier::Basic, t0());
        let params = Issue {
            tenant_id: Uuid::new_v4(),
            duration_days: 0,
            is_trial: true,
            max_users: None,
            max_tables: None,
            notes: None,
            issued_by: Some(Uuid::new_v4()),
        };
        assert!(matches!(issue(params, &plan, t0()), Err(ServiceError::Validation { field: "durationDays", .. })));
    }

    #[test]
    fn pause_resume_conserves_entitled_time() {
        let mut license = active(10);
        let end_before = license.ends_at.unwrap();

        pause(&mut license, "holiday closure".into(), t0()).unwrap();
        let later = t0() + Duration::days(4);
        let credited = resume(&mut license, later).unwrap();

        assert_eq!(credited, 4);
        assert_eq!(license.state, LicenseState::Active);
        assert_eq!(license.ends_at.unwrap(), end_before + Duration::days(4));
        assert_eq!(license.paused_days, 4);
        assert_eq!(days_remaining(license.ends_at, later), Some(10));
        assert!(license.paused_at.is_none());
    }

    #[test]
    fn partial_pause_days_round_in_the_tenants_favour() {
        let mut license = active(10);
        let end_before = license.ends_at.unwrap();
        pause(&mut license, "audit".into(), t0()).unwrap();
        resume(&mut license, t0() + Duration::hours(5)).unwrap();
        assert_eq!(license.ends_at.unwrap(), end_before + Duration::days(1));
    }

    #[test]
    fn resume_of_unpaused_license_changes_nothing() {
        let mut license = active(10);
        let before = license.clone();
        let err = resume(&mut license, t0() + Duration::days(2)).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition { action: "resume", from: LicenseState::Active }));
        assert_eq!(license, before);
    }

    #[test]
    fn paused_and_terminal_licenses_cannot_be_extended_or_paused() {
        let mut license = active(10);
        pause(&mut license, "x".into(), t0()).unwrap();
        assert!(matches!(
            extend(&mut license, 5, None, t0()),
            Err(ServiceError::InvalidTransition { action: "extend", .. })
        ));
        assert!(matches!(
            pause(&mut license, "again".into(), t0()),
            Err(ServiceError::InvalidTransition { action: "pause", .. })
        ));

        let mut expired = active(10);
        expired.state = LicenseState::Expired;
        assert!(extend(&mut expired, 5, None, t0()).is_err());
    }

    #[test]
    fn extend_counts_from_now_once_lapsed() {
        let mut license = active(10);
        let now = t0() + Duration::days(15);
        extend(&mut license, 7, Some("goodwill".into()), now).unwrap();
        assert_eq!(license.ends_at, Some(now + Duration::days(7)));

        let mut running = active(10);
        extend(&mut running, 7, None, t0()).unwrap();
        assert_eq!(running.ends_at, Some(t0() + Duration::days(17)));
        assert!(extend(&mut running, 0, None, t0()).is_err());
    }

    #[test]
    fn oversized_terms_are_validation_errors() {
        let mut license = active(10);
        let before = license.clone();
        assert!(matches!(
            extend(&mut license, 1_000_000_000_000, None, t0()),
            Err(ServiceError::Validation { field: "days", .. })
        ));
        assert!(matches!(
            extend(&mut license, i64::MAX, None, t0()),
            Err(ServiceError::Validation { field: "days", .. })
        ));
        assert_eq!(license, before);

        let end = t0() + Duration::days(MAX_TERM_DAYS);
        assert_eq!(add_days(t0(), MAX_TERM_DAYS, "days").unwrap(), end);
        assert!(add_days(DateTime::<Utc>::MAX_UTC, 1, "days").is_err());
    }

    #[test]
    fn apply_plan_keeps_state_and_dates() {
        let mut license = active(10);
        let before = license.clone();
        let enterprise = PlanDefinition::builtin(PlanTier::Enterprise, t0());
        apply_plan(&mut license, &enterprise, Some("upgrade".into()), t0());
        assert_eq!(license.plan, PlanTier::Enterprise);
        assert_eq!(license.max_users, 100);
        assert_eq!(license.state, before.state);
        assert_eq!(license.ends_at, before.ends_at);
    }
}
