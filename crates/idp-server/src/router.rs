//! Router configuration.

use std::sync::Arc;

use axum::{http::StatusCode, response::Json, routing::get, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use idp_saml::endpoints::{saml_router, SamlState};
use idp_saml::idp::IdentityProvider;

use crate::providers::{HeaderPrincipalResolver, InMemorySessionStore};

/// Creates the main application router.
pub fn create_router(
    idp: Arc<IdentityProvider>,
    sessions: Arc<InMemorySessionStore>,
    principals: Arc<HeaderPrincipalResolver>,
) -> Router {
    let sso_path = idp.config().sso_path.clone();
    let saml = saml_router(&sso_path).with_state(SamlState::new(idp, sessions, principals));

    let health = Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness_check));

    Router::new()
        .merge(saml)
        .merge(health)
        .layer(TraceLayer::new_for_http())
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Basic health check.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Liveness probe.
async fn liveness_check() -> StatusCode {
    StatusCode::OK
}
