use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use policy::CooldownState;

use crate::{auth::require_auth, AppState};

const DEFAULT_ACTIVITY_LIMIT: usize = 10;

pub fn api_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/activity", get(get_activity))
        .route("/api/trading", get(get_trading).post(post_trading))
        .route("/api/streams", get(get_streams))
        .route("/api/streams/:symbol/start", post(start_stream))
        .route("/api/streams/:symbol/stop", post(stop_stream))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}

// ─── Activity ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ActivityQuery {
    limit: Option<usize>,
}

async fn get_activity(
    State(state): State<AppState>,
    Query(q): Query<ActivityQuery>,
) -> Json<Value> {
    let limit = q
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .min(state.activity.capacity());
    let entries = state.activity.latest(limit);
    Json(json!({
        "count": entries.len(),
        "entries": entries,
    }))
}

// ─── Trading toggle ───────────────────────────────────────────────────────────

async fn get_trading(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "enabled": state.toggle.is_enabled().await }))
}

#[derive(Deserialize)]
struct TradingBody {
    enabled: bool,
}

async fn post_trading(
    State(state): State<AppState>,
    Json(body): Json<TradingBody>,
) -> (StatusCode, Json<Value>) {
    match state.toggle.set_enabled(body.enabled).await {
        Ok(()) => {
            info!(enabled = body.enabled, "Auto-trading toggled via API");
            (StatusCode::OK, Json(json!({ "enabled": body.enabled })))
        }
        Err(e) => {
            error!(error = %e, "Failed to persist auto-trading toggle");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

// ─── Streams ──────────────────────────────────────────────────────────────────

async fn get_streams(State(state): State<AppState>) -> Json<Value> {
    let now = Utc::now();
    let mut streams = Vec::with_capacity(state.streams.len());
    for controller in state.streams.iter() {
        let spec = controller.stream();
        let cooldown = match state.policy.cooldown_state(&spec.symbol, now).await {
            CooldownState::Idle => json!({ "state": "idle" }),
            CooldownState::Cooldown { remaining } => json!({
                "state": "cooldown",
                "remaining_secs": remaining.num_seconds(),
            }),
        };
        streams.push(json!({
            "symbol": spec.symbol,
            "interval": spec.interval,
            "quantity": spec.quantity,
            "running": controller.is_running(),
            "state": controller.state().to_string(),
            "cooldown": cooldown,
        }));
    }
    Json(json!({ "streams": streams }))
}

fn unknown_symbol(symbol: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("no stream configured for {symbol}") })),
    )
}

async fn start_stream(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> (StatusCode, Json<Value>) {
    let controllers = state.streams_for(&symbol);
    if controllers.is_empty() {
        return unknown_symbol(&symbol);
    }

    let mut started = Vec::new();
    let mut already_running = Vec::new();
    for controller in controllers {
        match controller.start() {
            Some(_) => started.push(controller.key()),
            None => already_running.push(controller.key()),
        }
    }
    (
        StatusCode::OK,
        Json(json!({ "started": started, "already_running": already_running })),
    )
}

async fn stop_stream(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> (StatusCode, Json<Value>) {
    let controllers = state.streams_for(&symbol);
    if controllers.is_empty() {
        return unknown_symbol(&symbol);
    }

    let stopped: Vec<String> = controllers
        .iter()
        .filter(|c| c.stop())
        .map(|c| c.key())
        .collect();
    (StatusCode::OK, Json(json!({ "stopped": stopped })))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use common::{ActivityEntry, TradingToggle};

    use crate::test_support::{authed, json_body, send, state};
    use crate::AppState;

    async fn get(state: &AppState, uri: &str) -> serde_json::Value {
        json_body(send(state, authed("GET", uri, Body::empty())).await).await
    }

    fn entry(close: f64) -> ActivityEntry {
        ActivityEntry {
            timestamp: Utc::now(),
            symbol: "BTCUSDT".into(),
            close,
            rsi: None,
            action: None,
            realized: false,
        }
    }

    #[tokio::test]
    async fn missing_or_wrong_token_is_rejected() {
        let state = state();
        let response = send(
            &state,
            Request::builder().uri("/api/activity").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(
            &state,
            Request::builder()
                .uri("/api/trading")
                .header("Authorization", "Bearer nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn activity_defaults_to_ten_most_recent_last() {
        let state = state();
        for i in 0..15 {
            state.activity.push(entry(i as f64));
        }
        let response = send(&state, authed("GET", "/api/activity", Body::empty())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["count"], 10);
        assert_eq!(body["entries"][0]["close"], 5.0);
        assert_eq!(body["entries"][9]["close"], 14.0);

        let body = get(&state, "/api/activity?limit=3").await;
        assert_eq!(body["count"], 3);
        assert_eq!(body["entries"][2]["close"], 14.0);
    }

    #[tokio::test]
    async fn empty_activity_is_an_empty_list() {
        let state = state();
        let body = get(&state, "/api/activity").await;
        assert_eq!(body["count"], 0);
        assert_eq!(body["entries"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn trading_toggle_round_trip() {
        let state = state();
        let body = get(&state, "/api/trading").await;
        assert_eq!(body["enabled"], false);

        let response = send(
            &state,
            authed("POST", "/api/trading", Body::from(r#"{"enabled":true}"#)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.toggle.is_enabled().await);

        let body = get(&state, "/api/trading").await;
        assert_eq!(body["enabled"], true);
    }

    #[tokio::test]
    async fn stream_start_is_idempotent_and_stop_works() {
        let state = state();
        let body = json_body(
            send(&state, authed("POST", "/api/streams/btcusdt/start", Body::empty())).await,
        )
        .await;
        assert_eq!(body["started"][0], "BTCUSDT@1m");

        let body = json_body(
            send(&state, authed("POST", "/api/streams/BTCUSDT/start", Body::empty())).await,
        )
        .await;
        assert_eq!(body["already_running"][0], "BTCUSDT@1m");

        let body = get(&state, "/api/streams").await;
        assert_eq!(body["streams"][0]["running"], true);
        assert_eq!(body["streams"][0]["cooldown"]["state"], "idle");

        let body = json_body(
            send(&state, authed("POST", "/api/streams/BTCUSDT/stop", Body::empty())).await,
        )
        .await;
        assert_eq!(body["stopped"][0], "BTCUSDT@1m");

        let handle = state.streams[0].handle().unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap();
        assert!(!state.streams[0].is_running());
    }

    #[tokio::test]
    async fn unknown_symbol_is_404() {
        let state = state();
        let response = send(
            &state,
            authed("POST", "/api/streams/DOGEUSDT/start", Body::empty()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
