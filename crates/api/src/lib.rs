mod auth;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use classifier::PortMode;
use common::{ActivityEntry, ActivityLog, Result, TradingToggle};
use engine::StreamController;
use policy::DecisionPolicy;

/// Shared application state injected into every route handler.
#[derive(Clone)]
pub struct AppState {
    pub activity: ActivityLog,
    /// Live activity entries for WebSocket clients.
    pub activity_tx: broadcast::Sender<ActivityEntry>,
    pub toggle: Arc<dyn TradingToggle>,
    pub policy: Arc<DecisionPolicy>,
    pub streams: Arc<Vec<Arc<StreamController>>>,
    pub classifier_mode: PortMode,
    pub dashboard_token: String,
}

impl AppState {
    /// Controllers whose symbol matches, case-insensitively.
    pub fn streams_for(&self, symbol: &str) -> Vec<Arc<StreamController>> {
        self.streams
            .iter()
            .filter(|c| c.stream().symbol.eq_ignore_ascii_case(symbol))
            .cloned()
            .collect()
    }
}

/// The full router: authenticated `/api/*`, `/ws/activity` and open `/healthz`.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any);

    Router::new()
        .merge(routes::api_router(state.clone()))
        .merge(routes::ws_router())
        .merge(routes::health_router())
        .with_state(state)
        .layer(cors)
}

/// Build and run the Axum API server.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = app(state);

    info!(%addr, "Dashboard API listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
