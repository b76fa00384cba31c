use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, patch, post, put},
    Router,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, warn};

use crate::config::AppConfig;
use crate::handlers::{elevated, public};
use crate::middleware::operator_gateway;
use crate::state::{log_sweep, AppState};

/// Full router: public tier plus the elevated tier behind the operator gateway
pub fn app(state: AppState, config: &AppConfig) -> Router {
    let mut router = Router::new()
        .merge(public_routes())
        .merge(elevated_routes(state.clone()))
        .layer(cors_layer(&config.security.cors_origins));

    if config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    router.with_state(state)
}

fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .route("/admin/login", post(public::login))
        .route("/admin/setup", post(public::setup))
        .route("/admin/impersonate/end", post(public::impersonate_end))
}

fn elevated_routes(state: AppState) -> Router<AppState> {
    use elevated::{impersonate, license, plan, tenant};

    Router::new()
        // Operators
        .route("/admin/me", get(elevated::me))
        .route("/admin/operators", post(elevated::operator_create))
        .route("/admin/dashboard", get(elevated::dashboard))
        // Tenants
        .route("/admin/tenants", post(tenant::tenant_create).get(tenant::tenant_list))
        .route("/admin/tenants-deleted", get(tenant::tenant_list_deleted))
        .route("/admin/tenants/:id", get(tenant::tenant_show))
        .route("/admin/tenants/:id/status", patch(tenant::tenant_status))
        .route("/admin/tenants/:id/reset-password", post(tenant::owner_reset_password))
        .route("/admin/tenants/:id/change-email", post(tenant::owner_change_email))
        .route("/admin/tenants/:id/toggle-lock", post(tenant::owner_toggle_lock))
        .route("/admin/tenants/:id/logout-all", post(tenant::owner_logout_all))
        .route("/admin/tenants/:id/change-plan", post(tenant::tenant_change_plan))
        .route("/admin/tenants/:id/delete", post(tenant::tenant_delete))
        .route("/admin/tenants/:id/audit", get(tenant::tenant_audit))
        // Licenses
        .route("/admin/licenses", post(license::license_issue).get(license::license_list))
        .route("/admin/licenses/:id", get(license::license_show))
        .route("/admin/licenses/:id/extend", post(license::license_extend))
        .route("/admin/licenses/:id/pause", post(license::license_pause))
        .route("/admin/licenses/:id/resume", post(license::license_resume))
        // Impersonation
        .route("/admin/impersonate", post(impersonate::impersonate_start))
        .route("/admin/impersonations", get(impersonate::impersonation_history))
        .route(
            "/admin/impersonations/:session_id/revoke",
            post(impersonate::impersonation_revoke),
        )
        // Plans
        .route("/admin/plans", get(plan::plan_list))
        .route("/admin/plans/:tier", put(plan::plan_update))
        // Audit
        .route("/admin/audit", get(elevated::audit_recent))
        .route("/admin/audit/verify", get(elevated::audit_verify))
        .route_layer(middleware::from_fn_with_state(state, operator_gateway))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Serve until the listener fails, with peer addresses available to handlers
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await
}

/// Background sweep on a fixed interval. Failures are logged and retried on the next tick.
pub fn spawn_sweeper(state: AppState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match state.sweep().await {
                Ok(report) => log_sweep(&report),
                Err(e) => error!("Sweep failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::clock::SystemClock;
    use crate::database::MemoryStore;

    fn test_app(config: &AppConfig) -> Router {
        let state = AppState::new(config, Arc::new(MemoryStore::new()), Arc::new(SystemClock)).unwrap();
        app(state, config)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_the_memory_backend() {
        let app = test_app(&AppConfig::development());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn elevated_routes_need_a_bearer() {
        let app = test_app(&AppConfig::development());
        let response = app
            .oneshot(Request::builder().uri("/admin/tenants").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error"], true);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn malformed_bearer_is_unauthorized() {
        let app = test_app(&AppConfig::development());
        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/admin/plans/basic")
                    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn configured_origins_are_echoed_on_preflight() {
        let mut config = AppConfig::development();
        config.security.cors_origins = vec!["https://console.example.com".to_string()];
        let app = test_app(&config);

        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/admin/login")
                    .header(header::ORIGIN, "https://console.example.com")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).and_then(|v| v.to_str().ok()),
            Some("https://console.example.com")
        );
    }
}
