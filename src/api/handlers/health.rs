use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::repository::source::bounded;
use crate::repository::SourceResolver;

pub type SharedResolver = Arc<SourceResolver>;

async fn metadata_reachable(resolver: &SourceResolver) -> crate::error::Result<()> {
    let metadata = resolver.metadata();
    bounded(
        resolver.query_timeout(),
        sqlx::query("SELECT 1").fetch_one(metadata.pool()),
    )
    .await?;
    Ok(())
}

/// Health check endpoint - checks metadata store connectivity
pub async fn health_check(State(resolver): State<SharedResolver>) -> (StatusCode, Json<Value>) {
    match metadata_reachable(&resolver).await {
        Ok(()) => {
            tracing::debug!("Health check passed - metadata store reachable");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "healthy",
                    "database": "connected",
                    "cached_schemas": resolver.cached_schema_count(),
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "database": "disconnected",
                    "error": "Metadata store unreachable"
                })),
            )
        }
    }
}

pub async fn readiness_check(State(resolver): State<SharedResolver>) -> (StatusCode, Json<Value>) {
    match metadata_reachable(&resolver).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "not ready",
                    "database": "disconnected"
                })),
            )
        }
    }
}

pub async fn liveness_check() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "alive"
        })),
    )
}
