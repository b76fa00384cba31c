mod common;

use anyhow::Result;
use chrono::Duration;
use uuid::Uuid;

use control_plane_api::auth::TENANT_AUDIENCE;
use control_plane_api::clock::Clock;
use control_plane_api::database::{Store, StoreTx};
use control_plane_api::services::audit_service::TrailEntry;
use control_plane_api::services::impersonation_service::StartImpersonation;
use control_plane_api::services::tenant_service::DeleteTenant;
use control_plane_api::services::{RequestOrigin, ServiceError};
use control_plane_api::types::{AuditAction, ImpersonationEvent, PlanTier};

use common::{TestContext, OPERATOR_EMAIL, OPERATOR_PASSWORD};

fn start(tenant_id: Uuid, user_id: Uuid) -> StartImpersonation {
    StartImpersonation {
        tenant_id,
        user_id,
        reason: Some("reproduce invoice bug".to_string()),
    }
}

#[tokio::test]
async fn grant_carries_target_and_acting_operator() -> Result<()> {
    let ctx = TestContext::new().await?;
    let created = ctx.create_tenant("Imp Cafe", "owner@imp.test").await?;
    ctx.issue_license(created.tenant.id, PlanTier::Basic, 30, true).await?;

    let grant = ctx
        .state
        .impersonation
        .start(&ctx.operator, start(created.tenant.id, created.owner.user_id))
        .await?;
    assert_eq!(grant.tenant_id, created.tenant.id);
    assert_eq!(grant.user.email, "owner@imp.test");
    assert_eq!(grant.acting_operator.email, OPERATOR_EMAIL);

    let claims = ctx.state.impersonation.verify(&grant.token).await?;
    assert_eq!(claims.sub, created.owner.user_id);
    assert_eq!(claims.tenant_id, created.tenant.id);
    assert_eq!(claims.sid, grant.session_id);
    assert_eq!(claims.aud, TENANT_AUDIENCE);
    assert_eq!(Some(claims.acting_operator.id), ctx.operator.operator_id);

    let history = ctx.state.impersonation.history(Some(created.tenant.id), None).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].event, ImpersonationEvent::Started);
    assert_eq!(history[0].metadata["license_state"], "trial");
    assert_eq!(history[0].metadata["tenant_name"], "Imp Cafe");
    Ok(())
}

#[tokio::test]
async fn ending_a_session_is_idempotent() -> Result<()> {
    let ctx = TestContext::new().await?;
    let created = ctx.create_tenant("Imp Cafe", "owner@imp.test").await?;
    let grant = ctx
        .state
        .impersonation
        .start(&ctx.operator, start(created.tenant.id, created.owner.user_id))
        .await?;

    let origin = RequestOrigin {
        ip: Some("10.1.2.3".to_string()),
        user_agent: Some("tenant-app/1.0".to_string()),
    };
    let first = ctx.state.impersonation.end(&grant.token, origin.clone()).await?;
    assert!(first.ended);
    let second = ctx.state.impersonation.end(&grant.token, origin).await?;
    assert!(!second.ended);

    let err = ctx.state.impersonation.verify(&grant.token).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)), "got {err:?}");

    let history = ctx.state.impersonation.history(Some(created.tenant.id), None).await?;
    let ended: Vec<_> = history.iter().filter(|e| e.event == ImpersonationEvent::Ended).collect();
    assert_eq!(ended.len(), 1);
    assert_eq!(ended[0].origin_ip.as_deref(), Some("10.1.2.3"));
    assert_eq!(ended[0].session_id, grant.session_id);
    Ok(())
}

#[tokio::test]
async fn operator_can_revoke_early() -> Result<()> {
    let ctx = TestContext::new().await?;
    let created = ctx.create_tenant("Imp Cafe", "owner@imp.test").await?;
    let grant = ctx
        .state
        .impersonation
        .start(&ctx.operator, start(created.tenant.id, created.owner.user_id))
        .await?;

    let revoked = ctx.state.impersonation.revoke(&ctx.operator, grant.session_id).await?;
    assert!(revoked.ended);
    assert!(ctx.state.impersonation.verify(&grant.token).await.is_err());

    let err = ctx
        .state
        .impersonation
        .revoke(&ctx.operator, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::SessionNotFound), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn refuses_operators_strangers_and_inactive_users() -> Result<()> {
    let ctx = TestContext::new().await?;
    let home = ctx.create_tenant("Home Diner", "owner@home.test").await?;
    let away = ctx.create_tenant("Away Diner", "owner@away.test").await?;
    let operator_id = ctx.operator.operator_id.unwrap_or_default();

    let err = ctx
        .state
        .impersonation
        .start(&ctx.operator, start(home.tenant.id, away.owner.user_id))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)), "got {err:?}");

    let err = ctx
        .state
        .impersonation
        .start(&ctx.operator, start(home.tenant.id, operator_id))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)), "got {err:?}");

    let staff = ctx.add_user(home.tenant.id, "staff@home.test").await?;
    let mut tx = ctx.store.begin().await?;
    tx.deactivate_tenant_users(home.tenant.id, chrono::Utc::now()).await?;
    tx.commit().await?;
    let err = ctx
        .state
        .impersonation
        .start(&ctx.operator, start(home.tenant.id, staff.id))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)), "got {err:?}");

    let err = ctx
        .state
        .impersonation
        .start(&ctx.operator, start(Uuid::new_v4(), staff.id))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::TenantNotFound), "got {err:?}");

    let err = ctx
        .state
        .impersonation
        .start(&ctx.operator, start(away.tenant.id, Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::UserNotFound), "got {err:?}");

    assert!(ctx.state.impersonation.history(None, None).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn deleted_tenants_cannot_be_impersonated() -> Result<()> {
    let ctx = TestContext::new().await?;
    let created = ctx.create_tenant("Closed Cafe", "owner@closed.test").await?;
    ctx.state
        .tenants
        .delete(
            &ctx.operator,
            created.tenant.id,
            DeleteTenant {
                reason: "business_closed".to_string(),
                detail: None,
                confirm_text: "DELETE Closed Cafe".to_string(),
                operator_password: OPERATOR_PASSWORD.to_string(),
            },
        )
        .await?;

    let err = ctx
        .state
        .impersonation
        .start(&ctx.operator, start(created.tenant.id, created.owner.user_id))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn deleting_the_tenant_closes_its_open_sessions() -> Result<()> {
    let ctx = TestContext::new().await?;
    let created = ctx.create_tenant("Closing Cafe", "owner@closing.test").await?;
    let tenant_id = created.tenant.id;
    let open = ctx
        .state
        .impersonation
        .start(&ctx.operator, start(tenant_id, created.owner.user_id))
        .await?;
    let finished = ctx
        .state
        .impersonation
        .start(&ctx.operator, start(tenant_id, created.owner.user_id))
        .await?;
    ctx.state.impersonation.revoke(&ctx.operator, finished.session_id).await?;

    let summary = ctx
        .state
        .tenants
        .delete(
            &ctx.operator,
            tenant_id,
            DeleteTenant {
                reason: "business_closed".to_string(),
                detail: None,
                confirm_text: "DELETE Closing Cafe".to_string(),
                operator_password: OPERATOR_PASSWORD.to_string(),
            },
        )
        .await?;
    assert_eq!(summary.impersonations_closed, 1);

    let err = ctx.state.impersonation.verify(&open.token).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)), "got {err:?}");

    let history = ctx.state.impersonation.history(Some(tenant_id), None).await?;
    let closings: Vec<_> = history
        .iter()
        .filter(|e| e.session_id == open.session_id && e.event == ImpersonationEvent::Ended)
        .collect();
    assert_eq!(closings.len(), 1);
    assert_eq!(closings[0].metadata["closed_by"], "tenant_deleted");

    let again = ctx.state.impersonation.end(&open.token, RequestOrigin::default()).await?;
    assert!(!again.ended);

    let deleted = ctx
        .state
        .audit
        .recent(Some(50))
        .await?
        .into_iter()
        .find(|r| r.tenant_id == Some(tenant_id) && r.action == AuditAction::TenantDeleted)
        .expect("tenant_deleted audit record");
    assert_eq!(deleted.details["impersonations_closed"], 1);
    Ok(())
}

#[tokio::test]
async fn verify_rejects_a_user_deactivated_after_start() -> Result<()> {
    let ctx = TestContext::new().await?;
    let created = ctx.create_tenant("Quiet Cafe", "owner@quiet.test").await?;
    let grant = ctx
        .state
        .impersonation
        .start(&ctx.operator, start(created.tenant.id, created.owner.user_id))
        .await?;
    ctx.state.impersonation.verify(&grant.token).await?;

    let mut tx = ctx.store.begin().await?;
    tx.deactivate_tenant_users(created.tenant.id, ctx.clock.now()).await?;
    tx.commit().await?;

    let err = ctx.state.impersonation.verify(&grant.token).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn lapsed_sessions_are_closed_by_the_sweep() -> Result<()> {
    let ctx = TestContext::new().await?;
    let created = ctx.create_tenant("Sleepy Cafe", "owner@sleepy.test").await?;
    let lapsing = ctx
        .state
        .impersonation
        .start(&ctx.operator, start(created.tenant.id, created.owner.user_id))
        .await?;
    let ended = ctx
        .state
        .impersonation
        .start(&ctx.operator, start(created.tenant.id, created.owner.user_id))
        .await?;
    ctx.state.impersonation.end(&ended.token, RequestOrigin::default()).await?;

    ctx.clock.advance(Duration::minutes(30));
    assert!(ctx.state.impersonation.close_lapsed().await?.is_empty());

    ctx.clock.advance(Duration::minutes(31));
    let report = ctx.state.sweep().await?;
    assert_eq!(report.sessions_closed, 1);
    assert!(ctx.state.impersonation.close_lapsed().await?.is_empty());

    let err = ctx.state.impersonation.verify(&lapsing.token).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)), "got {err:?}");

    let history = ctx.state.impersonation.history(Some(created.tenant.id), None).await?;
    let expired: Vec<_> = history.iter().filter(|e| e.event == ImpersonationEvent::Expired).collect();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].session_id, lapsing.session_id);
    Ok(())
}

#[tokio::test]
async fn tenant_trail_merges_audit_and_impersonation_events() -> Result<()> {
    let ctx = TestContext::new().await?;
    let created = ctx.create_tenant("Trail Cafe", "owner@trail.test").await?;
    let other = ctx.create_tenant("Other Cafe", "owner@othertrail.test").await?;

    ctx.clock.advance(Duration::minutes(1));
    let grant = ctx
        .state
        .impersonation
        .start(&ctx.operator, start(created.tenant.id, created.owner.user_id))
        .await?;
    ctx.clock.advance(Duration::minutes(1));
    ctx.issue_license(created.tenant.id, PlanTier::Basic, 30, false).await?;
    ctx.clock.advance(Duration::minutes(1));
    ctx.state.impersonation.end(&grant.token, RequestOrigin::default()).await?;
    ctx.issue_license(other.tenant.id, PlanTier::Basic, 30, false).await?;

    let trail = ctx.state.audit.tenant_trail(created.tenant.id, None).await?;
    assert_eq!(trail.len(), 4);
    assert!(trail.windows(2).all(|w| w[0].created_at() >= w[1].created_at()));
    assert!(matches!(&trail[0], TrailEntry::Impersonation(e) if e.event == ImpersonationEvent::Ended));
    assert!(matches!(&trail[3], TrailEntry::Audit(_)));

    let limited = ctx.state.audit.tenant_trail(created.tenant.id, Some(2)).await?;
    assert_eq!(limited.len(), 2);

    let err = ctx.state.audit.tenant_trail(Uuid::new_v4(), None).await.unwrap_err();
    assert!(matches!(err, ServiceError::TenantNotFound), "got {err:?}");
    Ok(())
}
