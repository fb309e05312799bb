use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::AppState;

pub fn health_router() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz))
}

/// Health check endpoint, no auth required.
/// Reports worker states and whether the classifier is degraded.
async fn healthz(State(state): State<AppState>) -> Json<Value> {
    let mut streams = Vec::with_capacity(state.streams.len());
    for controller in state.streams.iter() {
        streams.push(json!({
            "stream": controller.key(),
            "state": controller.state().to_string(),
        }));
    }
    Json(json!({
        "status": "ok",
        "classifier": state.classifier_mode,
        "streams": streams,
    }))
}
