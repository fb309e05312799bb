use std::collections::HashMap;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use common::{ActivityEntry, ActivityLog};

use crate::auth::{token_matches, unauthorized};
use crate::AppState;

pub fn ws_router() -> Router<AppState> {
    Router::new().route("/ws/activity", get(ws_activity_handler))
}

#[derive(Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// WebSocket endpoint that streams activity entries as JSON.
/// Auth via query param `?token=<DASHBOARD_TOKEN>` (header auth not supported
/// in browser WebSocket API).
async fn ws_activity_handler(
    State(state): State<AppState>,
    Query(q): Query<WsQuery>,
    ws: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let authed = q
        .token
        .as_deref()
        .map(|t| token_matches(&state, t))
        .unwrap_or(false);
    if !authed {
        return unauthorized();
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    // subscribe before the upgrade so nothing published in between is lost
    let activity_rx = state.activity_tx.subscribe();
    let activity = state.activity.clone();
    ws.on_upgrade(move |socket| handle_ws(socket, activity_rx, activity))
}

async fn handle_ws(
    mut socket: WebSocket,
    mut activity_rx: broadcast::Receiver<ActivityEntry>,
    activity: ActivityLog,
) {
    // History first, oldest first
    let history = activity.latest(activity.capacity());
    let cursor = HistoryCursor::new(&history);
    for entry in &history {
        if send_entry(&mut socket, entry).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            received = activity_rx.recv() => match received {
                Ok(entry) if !cursor.is_new(&entry) => {}
                Ok(entry) => {
                    if send_entry(&mut socket, &entry).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(dropped = n, "WebSocket activity client lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!("WebSocket activity client disconnected");
}

/// Last history timestamp per symbol. The broadcast receiver subscribes
/// before the snapshot is taken, so entries pushed in between arrive twice.
struct HistoryCursor {
    last_sent: HashMap<String, DateTime<Utc>>,
}

impl HistoryCursor {
    fn new(history: &[ActivityEntry]) -> Self {
        let mut last_sent = HashMap::new();
        for entry in history {
            last_sent.insert(entry.symbol.clone(), entry.timestamp);
        }
        Self { last_sent }
    }

    fn is_new(&self, entry: &ActivityEntry) -> bool {
        self.last_sent
            .get(&entry.symbol)
            .map_or(true, |&last| entry.timestamp > last)
    }
}

async fn send_entry(socket: &mut WebSocket, entry: &ActivityEntry) -> Result<(), ()> {
    let text = serde_json::to_string(entry).map_err(|_| ())?;
    socket.send(Message::Text(text)).await.map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, TimeZone, Utc};
    use common::ActivityEntry;

    use super::HistoryCursor;
    use crate::test_support::{send, state, TOKEN};

    fn entry(symbol: &str, minute: i64) -> ActivityEntry {
        ActivityEntry {
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap()
                + Duration::minutes(minute),
            symbol: symbol.into(),
            close: 100.0,
            rsi: None,
            action: None,
            realized: false,
        }
    }

    #[test]
    fn entries_already_in_history_are_not_resent() {
        let history = vec![entry("BTCUSDT", 0), entry("BTCUSDT", 1), entry("ETHUSDT", 0)];
        let cursor = HistoryCursor::new(&history);

        // published between subscribe and snapshot
        assert!(!cursor.is_new(&entry("BTCUSDT", 1)));
        assert!(!cursor.is_new(&entry("ETHUSDT", 0)));

        assert!(cursor.is_new(&entry("BTCUSDT", 2)));
        assert!(cursor.is_new(&entry("ETHUSDT", 1)));
        assert!(cursor.is_new(&entry("SOLUSDT", 0)));
    }

    #[test]
    fn empty_history_lets_everything_through() {
        let cursor = HistoryCursor::new(&[]);
        assert!(cursor.is_new(&entry("BTCUSDT", 0)));
    }

    #[tokio::test]
    async fn missing_token_is_rejected_before_upgrade() {
        let state = state();
        let response = send(
            &state,
            Request::builder().uri("/ws/activity").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(
            &state,
            Request::builder()
                .uri("/ws/activity?token=wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_token_without_upgrade_is_not_unauthorized() {
        let state = state();
        let response = send(
            &state,
            Request::builder()
                .uri(format!("/ws/activity?token={TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_ne!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.status().is_client_error());
    }
}
