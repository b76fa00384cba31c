// handlers/public/root.rs - GET / and GET /health

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Control Plane API",
            "version": version,
            "description": "Tenant, license and operator administration",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "login": "/admin/login (public - operator token acquisition)",
                "setup": "/admin/setup (public - first operator only)",
                "impersonate_end": "/admin/impersonate/end (impersonation token)",
                "tenants": "/admin/tenants[/:id] (operator)",
                "licenses": "/admin/licenses[/:id] (operator)",
                "plans": "/admin/plans[/:tier] (operator)",
                "impersonation": "/admin/impersonate, /admin/impersonations (operator)",
                "audit": "/admin/audit[/verify] (operator)",
            }
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = state.clock.now();

    match state.store.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": state.store.backend()
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": true,
                    "message": "database unavailable",
                    "code": "SERVICE_UNAVAILABLE",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "database": state.store.backend()
                    }
                })),
            )
        }
    }
}
