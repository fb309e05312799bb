use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use classifier::ClassifierPort;
use common::{ActivityLog, Config, TradingToggle};
use engine::{
    BinanceKlineFeed, FeedConfig, MarketFeed, OrderExecutor, PipelineContext, PipelineFileConfig,
    Record, Recorder, ReplayFeed, StreamController,
};
use paper::PaperTradeSink;
use policy::{DecisionPolicy, JsonFileToggle};

#[derive(Parser, Debug)]
#[command(author, version, about = "Kline-driven paper trading bot")]
struct Args {
    /// Pipeline TOML file. Overrides PIPELINE_CONFIG_PATH.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Replay newline-delimited kline frames from a file instead of Binance.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Do not start the dashboard API.
    #[arg(long)]
    no_api: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let args = Args::parse();
    let cfg = Config::from_env()?;
    let pipeline_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(&cfg.pipeline_config_path));
    let pipeline = PipelineFileConfig::load(&pipeline_path)
        .with_context(|| format!("loading {}", pipeline_path.display()))?;
    info!(
        config = %pipeline_path.display(),
        streams = pipeline.streams.len(),
        "KlineBot starting"
    );

    // ── Classifier ────────────────────────────────────────────────────────────
    let port = ClassifierPort::load(&pipeline.classifier);
    let classifier_mode = port.mode().clone();

    // ── Decision policy ───────────────────────────────────────────────────────
    let toggle: Arc<dyn TradingToggle> = Arc::new(JsonFileToggle::new(&pipeline.toggle.path));
    info!(enabled = toggle.is_enabled().await, "Auto-trading toggle read");
    let policy = Arc::new(DecisionPolicy::new(pipeline.policy.clone(), toggle.clone()));

    // ── Persistence (optional) ────────────────────────────────────────────────
    let record_tx = match &cfg.database_url {
        Some(url) => match engine::recorder::connect(url).await {
            Ok(db) => {
                let (tx, rx) = mpsc::channel::<Record>(1024);
                tokio::spawn(Recorder::new(rx, db).run());
                info!("Database ready");
                Some(tx)
            }
            Err(e) => {
                warn!(error = %e, "Database unavailable, continuing without persistence");
                None
            }
        },
        None => None,
    };

    // ── Trade sink + executor ─────────────────────────────────────────────────
    let sink = Arc::new(
        PaperTradeSink::new(cfg.paper_slippage_bps).with_trade_log(&cfg.trade_log_path),
    );
    let (order_tx, order_rx) = mpsc::channel::<common::Order>(128);
    let mut executor = OrderExecutor::new(order_rx, sink);
    if let Some(tx) = &record_tx {
        executor = executor.with_recorder(tx.clone());
    }

    // ── Activity ──────────────────────────────────────────────────────────────
    let activity = ActivityLog::new(pipeline.activity.capacity);
    let (activity_tx, _) = broadcast::channel(1024);

    let ctx = PipelineContext {
        classifier: Arc::new(port),
        policy: policy.clone(),
        activity: activity.clone(),
        activity_tx: activity_tx.clone(),
        order_tx,
        record_tx,
    };

    // ── Streams ───────────────────────────────────────────────────────────────
    let (feed, feed_cfg): (Arc<dyn MarketFeed>, FeedConfig) = match &args.replay {
        Some(path) => {
            let replay = ReplayFeed::from_file(path)?;
            info!(path = %path.display(), frames = replay.len(), "Replay mode");
            // a replay runs once
            let feed_cfg = FeedConfig {
                max_reconnects: Some(0),
                ..pipeline.feed.clone()
            };
            (Arc::new(replay), feed_cfg)
        }
        None => (Arc::new(BinanceKlineFeed::new()), pipeline.feed.clone()),
    };

    let controllers: Vec<Arc<StreamController>> = pipeline
        .streams
        .iter()
        .map(|stream| {
            Arc::new(StreamController::new(
                stream.clone(),
                pipeline.indicators.clone(),
                feed_cfg.clone(),
                feed.clone(),
                ctx.clone(),
            ))
        })
        .collect();
    // only the controllers keep order senders alive from here on
    drop(ctx);

    // ── Spawn all tasks ───────────────────────────────────────────────────────
    tokio::spawn(executor.run());
    for controller in &controllers {
        controller.start();
    }

    if !args.no_api {
        let api_state = api::AppState {
            activity,
            activity_tx,
            toggle,
            policy,
            streams: Arc::new(controllers.clone()),
            classifier_mode,
            dashboard_token: cfg.require_dashboard_token()?.to_string(),
        };
        let port = cfg.dashboard_port;
        tokio::spawn(async move {
            if let Err(e) = api::serve(api_state, port).await {
                tracing::error!(error = %e, "Dashboard API stopped");
            }
        });
    }

    info!("All subsystems started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutdown signal received. Stopping streams.");

    let handles: Vec<_> = controllers.iter().filter_map(|c| c.handle()).collect();
    for controller in &controllers {
        controller.stop();
    }
    for handle in handles {
        if tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .is_err()
        {
            warn!(stream = handle.key(), "Stream worker did not stop in time");
        }
    }
    info!("Exiting.");
    Ok(())
}
