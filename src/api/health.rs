/// Health check endpoints for liveness and readiness probes
use crate::{
    context::AppContext,
    error::FlockResult,
    store::Collection,
};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Health status of one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    /// "healthy" or "unhealthy"
    pub status: String,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health_basic))
        .route("/health/ready", get(readiness_probe))
}

/// Basic liveness check
pub async fn health_basic() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness probe: the record store must answer a point lookup
pub async fn readiness_probe(
    State(ctx): State<AppContext>,
) -> (StatusCode, Json<ComponentHealth>) {
    let store = check_store_detailed(&ctx).await;

    let status = if store.status == "healthy" {
        StatusCode::OK
    } else {
        tracing::warn!(error = ?store.error, "readiness_probe_failed: record store check failed");
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(store))
}

async fn check_store(ctx: &AppContext) -> FlockResult<()> {
    ctx.store.exists(Collection::Accounts, "").await?;
    Ok(())
}

async fn check_store_detailed(ctx: &AppContext) -> ComponentHealth {
    let start = Instant::now();
    let result = check_store(ctx).await;

    ComponentHealth {
        name: "record_store".to_string(),
        status: if result.is_ok() { "healthy" } else { "unhealthy" }.to_string(),
        response_time_ms: start.elapsed().as_millis() as u64,
        error: result.err().map(|e| e.to_string()),
    }
}
