use axum::{routing::get, Router};

use super::handlers::health::{health_check, liveness_check, readiness_check, SharedResolver};

pub fn health_routes(resolver: SharedResolver) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
        .with_state(resolver)
}
