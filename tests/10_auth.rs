mod common;

use std::sync::Arc;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;

use control_plane_api::clock::{Clock, ManualClock};
use control_plane_api::config::AppConfig;
use control_plane_api::database::{MemoryStore, Store, StoreTx};
use control_plane_api::services::impersonation_service::StartImpersonation;
use control_plane_api::services::operator_service::NewOperator;
use control_plane_api::services::{Actor, ServiceError};
use control_plane_api::state::AppState;

use common::{TestContext, OPERATOR_EMAIL, OPERATOR_PASSWORD};

#[tokio::test]
async fn health_and_root_are_public() -> Result<()> {
    let ctx = TestContext::new().await?;
    let server = ctx.spawn_server().await?;

    let (status, body) = server.get("/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["database"], "memory");

    let (status, body) = server.get("/", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    Ok(())
}

#[tokio::test]
async fn login_issues_an_operator_token() -> Result<()> {
    let ctx = TestContext::new().await?;
    let server = ctx.spawn_server().await?;

    let (status, body) = server
        .post(
            "/admin/login",
            None,
            &json!({ "email": OPERATOR_EMAIL, "password": OPERATOR_PASSWORD }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(body["data"]["operator"]["email"], OPERATOR_EMAIL);

    let token = body["data"]["token"].as_str().unwrap_or_default();
    let (status, me) = server.get("/admin/me", Some(token)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["data"]["email"], OPERATOR_EMAIL);
    assert!(me["data"]["last_login_at"].is_string());
    Ok(())
}

#[tokio::test]
async fn wrong_password_and_unknown_email_look_the_same() -> Result<()> {
    let ctx = TestContext::new().await?;
    let server = ctx.spawn_server().await?;

    let (wrong_status, wrong) = server
        .post("/admin/login", None, &json!({ "email": OPERATOR_EMAIL, "password": "not-the-password" }))
        .await?;
    let (unknown_status, unknown) = server
        .post("/admin/login", None, &json!({ "email": "nobody@control-plane.test", "password": "whatever123" }))
        .await?;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong["message"], unknown["message"]);
    Ok(())
}

#[tokio::test]
async fn locked_operator_is_refused_after_correct_password() -> Result<()> {
    let ctx = TestContext::new().await?;
    let operator_id = ctx.operator.operator_id.unwrap_or_default();

    let mut tx = ctx.store.begin().await?;
    tx.set_locked(operator_id, true, ctx.clock.now()).await?;
    tx.commit().await?;

    let err = ctx
        .state
        .operators
        .login(OPERATOR_EMAIL, OPERATOR_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn gateway_rejects_missing_malformed_and_expired_tokens() -> Result<()> {
    let ctx = TestContext::new().await?;
    let server = ctx.spawn_server().await?;

    let (status, body) = server.get("/admin/tenants", None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = server.get("/admin/tenants", Some("not-a-jwt")).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = server.login().await?;
    ctx.clock.advance(chrono::Duration::hours(9));
    let (status, _) = server.get("/admin/tenants", Some(&token)).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn impersonation_tokens_cannot_reach_the_admin_surface() -> Result<()> {
    let ctx = TestContext::new().await?;
    let created = ctx.create_tenant("Gateway Bistro", "owner@gateway.test").await?;
    let grant = ctx
        .state
        .impersonation
        .start(
            &ctx.operator,
            StartImpersonation {
                tenant_id: created.tenant.id,
                user_id: created.owner.user_id,
                reason: None,
            },
        )
        .await?;

    let server = ctx.spawn_server().await?;
    let (status, body) = server.get("/admin/tenants", Some(&grant.token)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
    Ok(())
}

#[tokio::test]
async fn locked_operator_token_stops_working() -> Result<()> {
    let ctx = TestContext::new().await?;
    let server = ctx.spawn_server().await?;
    let token = server.login().await?;

    let operator_id = ctx.operator.operator_id.unwrap_or_default();
    let mut tx = ctx.store.begin().await?;
    tx.set_locked(operator_id, true, ctx.clock.now()).await?;
    tx.commit().await?;

    let (status, _) = server.get("/admin/me", Some(&token)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn setup_creates_only_the_first_operator() -> Result<()> {
    let mut config = AppConfig::development();
    config.security.bcrypt_cost = 4;
    let state = AppState::new(&config, Arc::new(MemoryStore::new()), Arc::new(ManualClock::starting_now()))?;

    let first = state
        .operators
        .setup(
            &Actor::cli(),
            NewOperator {
                name: "First Operator".to_string(),
                email: "first@control-plane.test".to_string(),
                password: Some("first-password".to_string()),
            },
        )
        .await?;
    assert_eq!(first.operator.email, "first@control-plane.test");
    assert!(first.temporary_password.is_none());

    let err = state
        .operators
        .setup(
            &Actor::cli(),
            NewOperator {
                name: "Second Operator".to_string(),
                email: "second@control-plane.test".to_string(),
                password: Some("second-password".to_string()),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)), "got {err:?}");

    let login = state.operators.login("first@control-plane.test", "first-password").await?;
    assert_eq!(login.operator.id, first.operator.id);
    Ok(())
}

#[tokio::test]
async fn setup_route_is_closed_once_an_operator_exists() -> Result<()> {
    let ctx = TestContext::new().await?;
    let server = ctx.spawn_server().await?;

    let (status, _) = server
        .post(
            "/admin/setup",
            None,
            &json!({ "name": "Intruder", "email": "intruder@evil.test", "password": "long-enough-pw" }),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}
