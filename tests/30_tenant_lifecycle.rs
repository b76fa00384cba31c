mod common;

use anyhow::Result;
use chrono::Duration;

use control_plane_api::auth::password::verify_password;
use control_plane_api::clock::Clock;
use control_plane_api::database::models::LicenseFilter;
use control_plane_api::database::{Store, StoreTx};
use control_plane_api::services::tenant_service::{AlertKind, DeleteTenant, Severity};
use control_plane_api::services::ServiceError;
use control_plane_api::types::{AuditAction, DeleteReason, LicenseState, PlanTier, TenantStatus};

use common::{TestContext, OPERATOR_PASSWORD};

fn delete_request(confirm: &str, password: &str) -> DeleteTenant {
    DeleteTenant {
        reason: "customer_request".to_string(),
        detail: None,
        confirm_text: confirm.to_string(),
        operator_password: password.to_string(),
    }
}

async fn actions_for(ctx: &TestContext, tenant_id: uuid::Uuid) -> Result<Vec<AuditAction>> {
    let records = ctx.state.audit.recent(Some(500)).await?;
    Ok(records
        .into_iter()
        .filter(|r| r.tenant_id == Some(tenant_id))
        .map(|r| r.action)
        .collect())
}

#[tokio::test]
async fn create_returns_the_owner_password_once() -> Result<()> {
    let ctx = TestContext::new().await?;
    let created = ctx.create_tenant("Acme Bistro", "Ana@Acme.test").await?;

    assert_eq!(created.tenant.slug, "acme-bistro");
    assert_eq!(created.tenant.status, TenantStatus::Active);
    assert_eq!(created.tenant.plan, None);
    assert_eq!(created.owner.email, "ana@acme.test");
    assert_eq!(created.owner.username, "ana");

    let owner = ctx.find_user(created.owner.user_id).await?;
    assert!(owner.role_id.is_some());
    assert_ne!(owner.password_hash, created.owner.temporary_password);
    assert!(verify_password(&created.owner.temporary_password, &owner.password_hash).await?);

    assert_eq!(actions_for(&ctx, created.tenant.id).await?, vec![AuditAction::TenantCreated]);
    Ok(())
}

#[tokio::test]
async fn create_validates_input_and_email_uniqueness() -> Result<()> {
    let ctx = TestContext::new().await?;
    ctx.create_tenant("First Place", "shared@owner.test").await?;

    let err = ctx.create_tenant("Second Place", "SHARED@owner.test").await.unwrap_err();
    let err = err.downcast::<ServiceError>()?;
    assert!(matches!(err, ServiceError::DuplicateEmail(_)), "got {err:?}");

    let err = ctx.create_tenant("ab", "short@owner.test").await.unwrap_err();
    let err = err.downcast::<ServiceError>()?;
    assert!(matches!(err, ServiceError::Validation { field: "name", .. }), "got {err:?}");

    let err = ctx.create_tenant("Bad Email", "not-an-email").await.unwrap_err();
    let err = err.downcast::<ServiceError>()?;
    assert!(matches!(err, ServiceError::Validation { field: "ownerEmail", .. }), "got {err:?}");

    let tenants = ctx.state.tenants.list(None).await?;
    assert_eq!(tenants.len(), 1);
    Ok(())
}

#[tokio::test]
async fn same_names_get_distinct_slugs() -> Result<()> {
    let ctx = TestContext::new().await?;
    let first = ctx.create_tenant("La Esquina", "one@esquina.test").await?;
    let second = ctx.create_tenant("La Esquina", "two@esquina.test").await?;

    assert_eq!(first.tenant.slug, "la-esquina");
    assert_eq!(second.tenant.slug, "la-esquina-2");
    Ok(())
}

#[tokio::test]
async fn delete_cascades_through_users_sessions_and_licenses() -> Result<()> {
    let ctx = TestContext::new().await?;
    let created = ctx.create_tenant("Acme", "owner@acme.test").await?;
    let tenant_id = created.tenant.id;
    let staff = ctx.add_user(tenant_id, "staff@acme.test").await?;
    ctx.add_session(tenant_id, created.owner.user_id).await?;
    ctx.add_session(tenant_id, staff.id).await?;
    let license = ctx.issue_license(tenant_id, PlanTier::Professional, 365, false).await?;

    let summary = ctx
        .state
        .tenants
        .delete(&ctx.operator, tenant_id, delete_request("DELETE Acme", OPERATOR_PASSWORD))
        .await?;
    assert_eq!(summary.users_deactivated, 2);
    assert_eq!(summary.sessions_invalidated, 2);
    assert_eq!(summary.licenses_cancelled, 1);

    assert!(!ctx.find_user(created.owner.user_id).await?.active);
    assert!(!ctx.find_user(staff.id).await?.active);
    assert_eq!(ctx.live_sessions(tenant_id).await?, 0);

    let cancelled = ctx.state.licenses.find(license.license.id).await?;
    assert_eq!(cancelled.license.state, LicenseState::Cancelled);
    assert_eq!(
        cancelled.license.change_reason.as_deref(),
        Some("tenant deleted: customer_request")
    );

    let deleted = ctx.state.tenants.list_deleted().await?;
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].delete_reason, Some(DeleteReason::CustomerRequest));
    assert_eq!(deleted[0].deleted_by, ctx.operator.operator_id);
    assert!(ctx.state.tenants.list(None).await?.is_empty());

    let err = ctx.state.tenants.detail(tenant_id).await.unwrap_err();
    assert!(matches!(err, ServiceError::TenantNotFound), "got {err:?}");

    let actions = actions_for(&ctx, tenant_id).await?;
    assert_eq!(actions.iter().filter(|a| **a == AuditAction::TenantDeleted).count(), 1);
    Ok(())
}

#[tokio::test]
async fn wrong_confirmation_changes_nothing_but_is_audited() -> Result<()> {
    let ctx = TestContext::new().await?;
    let created = ctx.create_tenant("Acme", "owner@acme.test").await?;
    let tenant_id = created.tenant.id;
    ctx.add_session(tenant_id, created.owner.user_id).await?;

    let err = ctx
        .state
        .tenants
        .delete(&ctx.operator, tenant_id, delete_request("DELETE Acme Corp", OPERATOR_PASSWORD))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ConfirmationMismatch), "got {err:?}");

    let detail = ctx.state.tenants.detail(tenant_id).await?;
    assert_eq!(detail.tenant.status, TenantStatus::Active);
    assert!(ctx.find_user(created.owner.user_id).await?.active);
    assert_eq!(ctx.live_sessions(tenant_id).await?, 1);

    let failures = ctx.state.audit.recent(Some(500)).await?;
    let failure = failures
        .iter()
        .find(|r| r.action == AuditAction::TenantDeleteFailed)
        .expect("failed attempt recorded");
    assert_eq!(failure.tenant_id, Some(tenant_id));
    assert_eq!(failure.details["error"], "confirmation_mismatch");
    Ok(())
}

#[tokio::test]
async fn wrong_operator_password_blocks_delete() -> Result<()> {
    let ctx = TestContext::new().await?;
    let created = ctx.create_tenant("Acme", "owner@acme.test").await?;

    let err = ctx
        .state
        .tenants
        .delete(&ctx.operator, created.tenant.id, delete_request("DELETE Acme", "guessing-wrong"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::WrongPassword), "got {err:?}");
    assert!(ctx.find_user(created.owner.user_id).await?.active);
    Ok(())
}

#[tokio::test]
async fn other_reason_needs_a_real_explanation() -> Result<()> {
    let ctx = TestContext::new().await?;
    let created = ctx.create_tenant("Acme", "owner@acme.test").await?;

    let mut request = delete_request("DELETE Acme", OPERATOR_PASSWORD);
    request.reason = "other".to_string();
    request.detail = Some("short".to_string());
    let err = ctx
        .state
        .tenants
        .delete(&ctx.operator, created.tenant.id, request.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation { field: "detail", .. }), "got {err:?}");

    request.reason = "bored".to_string();
    let err = ctx
        .state
        .tenants
        .delete(&ctx.operator, created.tenant.id, request.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation { field: "reason", .. }), "got {err:?}");

    request.reason = "other".to_string();
    request.detail = Some("Merged into the parent company account".to_string());
    let summary = ctx.state.tenants.delete(&ctx.operator, created.tenant.id, request).await?;
    assert_eq!(summary.users_deactivated, 1);
    Ok(())
}

#[tokio::test]
async fn deleting_twice_is_refused() -> Result<()> {
    let ctx = TestContext::new().await?;
    let created = ctx.create_tenant("Acme", "owner@acme.test").await?;

    ctx.state
        .tenants
        .delete(&ctx.operator, created.tenant.id, delete_request("DELETE Acme", OPERATOR_PASSWORD))
        .await?;
    let err = ctx
        .state
        .tenants
        .delete(&ctx.operator, created.tenant.id, delete_request("DELETE Acme", OPERATOR_PASSWORD))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::TenantDeleted), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn storage_failure_mid_cascade_rolls_everything_back() -> Result<()> {
    let ctx = TestContext::new().await?;
    let created = ctx.create_tenant("Acme", "owner@acme.test").await?;
    let tenant_id = created.tenant.id;
    ctx.add_session(tenant_id, created.owner.user_id).await?;
    let license = ctx.issue_license(tenant_id, PlanTier::Basic, 30, false).await?;

    ctx.store.fail_operation("delete_tenant_sessions");
    let err = ctx
        .state
        .tenants
        .delete(&ctx.operator, tenant_id, delete_request("DELETE Acme", OPERATOR_PASSWORD))
        .await
        .unwrap_err();
    ctx.store.clear_failures();
    assert!(matches!(err, ServiceError::Database(_)), "got {err:?}");

    let detail = ctx.state.tenants.detail(tenant_id).await?;
    assert!(detail.tenant.deleted_at.is_none());
    assert!(ctx.find_user(created.owner.user_id).await?.active);
    assert_eq!(ctx.live_sessions(tenant_id).await?, 1);
    let reread = ctx.state.licenses.find(license.license.id).await?;
    assert_eq!(reread.license.state, LicenseState::Active);

    let actions = actions_for(&ctx, tenant_id).await?;
    assert!(actions.contains(&AuditAction::TenantDeleteFailed));
    assert!(!actions.contains(&AuditAction::TenantDeleted));
    Ok(())
}

#[tokio::test]
async fn storage_failure_during_create_leaves_no_rows() -> Result<()> {
    let ctx = TestContext::new().await?;
    let before = ctx.store.row_counts().await;

    ctx.store.fail_operation("insert_categories");
    let err = ctx
        .create_tenant("Acme", "owner@acme.test")
        .await
        .unwrap_err()
        .downcast::<ServiceError>()?;
    ctx.store.clear_failures();
    assert!(matches!(err, ServiceError::Database(_)), "got {err:?}");

    assert_eq!(ctx.store.row_counts().await, before);
    assert!(ctx.state.tenants.list(None).await?.is_empty());

    // Name and email are free again
    let created = ctx.create_tenant("Acme", "owner@acme.test").await?;
    assert_eq!(created.tenant.slug, "acme");
    let after = ctx.store.row_counts().await;
    assert_eq!(after.tenants, before.tenants + 1);
    assert_eq!(after.roles, before.roles + 1);
    assert_eq!(after.users, before.users + 1);
    Ok(())
}

#[tokio::test]
async fn owner_support_actions_are_audited() -> Result<()> {
    let ctx = TestContext::new().await?;
    let created = ctx.create_tenant("Support Spot", "owner@support.test").await?;
    let other = ctx.create_tenant("Other Spot", "owner@other.test").await?;
    let tenant_id = created.tenant.id;

    let reset = ctx.state.tenants.reset_owner_password(&ctx.operator, tenant_id).await?;
    assert_ne!(reset.temporary_password, created.owner.temporary_password);
    let owner = ctx.find_user(created.owner.user_id).await?;
    assert!(verify_password(&reset.temporary_password, &owner.password_hash).await?);

    let err = ctx
        .state
        .tenants
        .change_owner_email(&ctx.operator, tenant_id, &other.owner.email)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::DuplicateEmail(_)), "got {err:?}");
    let changed = ctx
        .state
        .tenants
        .change_owner_email(&ctx.operator, tenant_id, "New.Owner@support.test")
        .await?;
    assert_eq!(changed.email, "new.owner@support.test");

    let locked = ctx.state.tenants.set_owner_lock(&ctx.operator, tenant_id, true).await?;
    assert!(locked.locked);
    let unlocked = ctx.state.tenants.set_owner_lock(&ctx.operator, tenant_id, false).await?;
    assert!(!unlocked.locked);

    ctx.add_session(tenant_id, created.owner.user_id).await?;
    ctx.add_session(tenant_id, created.owner.user_id).await?;
    ctx.add_session(other.tenant.id, other.owner.user_id).await?;
    assert_eq!(ctx.state.tenants.logout_all(&ctx.operator, tenant_id).await?, 2);
    assert_eq!(ctx.live_sessions(other.tenant.id).await?, 1);

    let actions = actions_for(&ctx, tenant_id).await?;
    for expected in [
        AuditAction::OwnerPasswordReset,
        AuditAction::OwnerEmailChanged,
        AuditAction::OwnerLocked,
        AuditAction::OwnerUnlocked,
        AuditAction::SessionsRevoked,
    ] {
        assert_eq!(actions.iter().filter(|a| **a == expected).count(), 1, "{expected}");
    }
    Ok(())
}

#[tokio::test]
async fn owner_actions_are_refused_for_deleted_tenants() -> Result<()> {
    let ctx = TestContext::new().await?;
    let created = ctx.create_tenant("Gone Grill", "owner@gone.test").await?;
    ctx.state
        .tenants
        .delete(&ctx.operator, created.tenant.id, delete_request("DELETE Gone Grill", OPERATOR_PASSWORD))
        .await?;

    let err = ctx
        .state
        .tenants
        .reset_owner_password(&ctx.operator, created.tenant.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::TenantDeleted), "got {err:?}");
    let err = ctx.state.tenants.logout_all(&ctx.operator, created.tenant.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::TenantDeleted), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn suspend_and_reactivate() -> Result<()> {
    let ctx = TestContext::new().await?;
    let created = ctx.create_tenant("Switch Cafe", "owner@switch.test").await?;

    let suspended = ctx
        .state
        .tenants
        .set_status(&ctx.operator, created.tenant.id, TenantStatus::Suspended)
        .await?;
    assert_eq!(suspended.status, TenantStatus::Suspended);
    assert_eq!(ctx.state.tenants.list(Some(TenantStatus::Suspended)).await?.len(), 1);
    assert!(ctx.state.tenants.list(Some(TenantStatus::Active)).await?.is_empty());

    ctx.state
        .tenants
        .set_status(&ctx.operator, created.tenant.id, TenantStatus::Active)
        .await?;

    let err = ctx
        .state
        .tenants
        .set_status(&ctx.operator, created.tenant.id, TenantStatus::Deleted)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation { field: "status", .. }), "got {err:?}");

    let actions = actions_for(&ctx, created.tenant.id).await?;
    assert!(actions.contains(&AuditAction::TenantSuspended));
    assert!(actions.contains(&AuditAction::TenantActivated));
    Ok(())
}

#[tokio::test]
async fn detail_raises_health_alerts() -> Result<()> {
    let ctx = TestContext::new().await?;
    let created = ctx.create_tenant("Alert Kitchen", "owner@alert.test").await?;
    let tenant_id = created.tenant.id;
    ctx.issue_license(tenant_id, PlanTier::Basic, 30, false).await?;

    let mut tx = ctx.store.begin().await?;
    tx.touch_last_login(created.owner.user_id, ctx.clock.now()).await?;
    tx.commit().await?;

    ctx.clock.advance(Duration::days(28));
    let detail = ctx.state.tenants.detail(tenant_id).await?;
    assert_eq!(detail.metrics.total_users, 1);
    assert_eq!(detail.health.days_since_last_access, Some(28));
    assert_eq!(detail.license.as_ref().and_then(|l| l.days_remaining), Some(2));

    let kinds: Vec<(AlertKind, Severity)> = detail.health.alerts.iter().map(|a| (a.kind, a.severity)).collect();
    assert!(kinds.contains(&(AlertKind::NoActivity, Severity::Warning)));
    assert!(kinds.contains(&(AlertKind::LicenseExpiring, Severity::Danger)));
    assert_eq!(detail.owner.as_ref().map(|o| o.email.as_str()), Some("owner@alert.test"));
    Ok(())
}

#[tokio::test]
async fn dashboard_counts_live_tenants_and_licenses() -> Result<()> {
    let ctx = TestContext::new().await?;
    let trial = ctx.create_tenant("Trial One", "owner@trialone.test").await?;
    let paid = ctx.create_tenant("Paid Two", "owner@paidtwo.test").await?;
    let gone = ctx.create_tenant("Gone Three", "owner@gonethree.test").await?;

    ctx.issue_license(trial.tenant.id, PlanTier::Basic, 5, true).await?;
    ctx.issue_license(paid.tenant.id, PlanTier::Professional, 365, false).await?;
    ctx.state
        .tenants
        .set_status(&ctx.operator, paid.tenant.id, TenantStatus::Suspended)
        .await?;
    ctx.state
        .tenants
        .delete(&ctx.operator, gone.tenant.id, delete_request("DELETE Gone Three", OPERATOR_PASSWORD))
        .await?;

    let dashboard = ctx.state.tenants.dashboard().await?;
    assert_eq!(dashboard.tenants.total, 2);
    assert_eq!(dashboard.tenants.active, 1);
    assert_eq!(dashboard.tenants.suspended, 1);
    assert_eq!(dashboard.tenants.on_trial, 1);
    assert_eq!(dashboard.licenses.entitled, 2);
    assert_eq!(dashboard.licenses.expiring_soon, 1);
    assert_eq!(dashboard.users, 2);

    let open = ctx
        .state
        .licenses
        .list(&LicenseFilter {
            state: Some(LicenseState::Trial),
            ..LicenseFilter::default()
        })
        .await?;
    assert_eq!(open.len(), 1);
    Ok(())
}
