//! API route handlers

use axum::{extract::State, Json};
use serde_json::{json, Value};

use super::AppState;
use crate::rate_limit::Clock;

/// `GET /v1/health`
pub async fn health<C: Clock>(State(state): State<AppState<C>>) -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "environment": state.environment,
            "version": state.version,
        }
    }))
}

/// `GET /v1/test`
pub async fn test_endpoint() -> Json<Value> {
    Json(json!({
        "message": "Rate limiter test endpoint",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
