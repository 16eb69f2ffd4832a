//! Health check endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.health.snapshot().await;

    Json(json!({
        "status": snapshot.status(),
        "service": "loanpush-worker",
        "version": env!("CARGO_PKG_VERSION"),
        "rate_limit": state.limiter.snapshot(),
        "batch_size": state.batch_size,
        "last_batch": snapshot.last_batch,
        "last_reminders": snapshot.last_reminders,
    }))
}
