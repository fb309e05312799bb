use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc};

use classifier::{Classification, Classifier, ClassifierPort};
use common::{Action, ActivityLog, Fill, Order, Result, TradeSink};
use engine::{
    FeedConfig, OrderExecutor, PipelineContext, ReplayFeed, StreamConfig, StreamController,
};
use indicators::{FeatureVector, IndicatorConfig};
use policy::{DecisionPolicy, MemoryToggle, PolicyConfig};

struct BuyAboveSixty;

impl Classifier for BuyAboveSixty {
    fn name(&self) -> &str {
        "buy-above-60"
    }

    fn classify(&self, features: &FeatureVector) -> Classification {
        match features.rsi {
            Some(rsi) if rsi > 60.0 => Classification {
                action: Action::Buy,
                confidence: None,
            },
            _ => Classification::hold(),
        }
    }
}

#[derive(Default)]
struct CountingSink {
    placed: AtomicUsize,
}

#[async_trait]
impl TradeSink for CountingSink {
    async fn place(&self, order: &Order) -> Result<Fill> {
        self.placed.fetch_add(1, Ordering::SeqCst);
        Ok(Fill {
            order_id: order.id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            fill_price: order.reference_price,
            quantity: order.quantity,
            timestamp: Utc::now(),
        })
    }
}

fn kline(index: i64, close: f64) -> String {
    let open_time = 1_700_000_000_000i64 + index * 60_000;
    format!(
        r#"{{"e":"kline","E":{open_time},"s":"BTCUSDT","k":{{"t":{open_time},"i":"1m","o":"{close}","h":"{close}","l":"{close}","c":"{close}","v":"3.5","x":true}}}}"#
    )
}

struct Run {
    activity: ActivityLog,
    sink: Arc<CountingSink>,
}

async fn run_scenario(frames: Vec<String>, enabled: bool, capacity: usize) -> Run {
    run_with(Arc::new(BuyAboveSixty), frames, enabled, capacity).await
}

async fn run_with(
    classifier: Arc<dyn Classifier>,
    frames: Vec<String>,
    enabled: bool,
    capacity: usize,
) -> Run {
    let toggle = Arc::new(MemoryToggle::new(enabled));
    let policy = Arc::new(DecisionPolicy::new(
        PolicyConfig {
            cooldown_secs: 300,
            ..PolicyConfig::default()
        },
        toggle,
    ));
    let (order_tx, order_rx) = mpsc::channel(16);
    let (activity_tx, _) = broadcast::channel(64);
    let activity = ActivityLog::new(capacity);
    let sink = Arc::new(CountingSink::default());
    let executor = tokio::spawn(OrderExecutor::new(order_rx, sink.clone()).run());

    let ctx = PipelineContext {
        classifier,
        policy,
        activity: activity.clone(),
        activity_tx,
        order_tx,
        record_tx: None,
    };
    let controller = StreamController::new(
        StreamConfig::new("BTCUSDT", "1m", 0.001),
        IndicatorConfig::default(),
        FeedConfig {
            max_backoff_secs: 1,
            max_reconnects: Some(0),
        },
        Arc::new(ReplayFeed::new(frames)),
        ctx,
    );

    let handle = controller.start().expect("worker starts");
    tokio::time::timeout(Duration::from_secs(5), handle.join())
        .await
        .expect("replay drains and the worker stops");

    // closing the last order sender lets the executor drain and exit
    drop(controller);
    tokio::time::timeout(Duration::from_secs(5), executor)
        .await
        .expect("executor exits")
        .unwrap();

    Run { activity, sink }
}

#[tokio::test]
async fn twenty_increasing_candles_realize_one_buy() {
    let frames = (0..20).map(|i| kline(i, 100.0 + i as f64)).collect();
    let run = run_scenario(frames, true, 100).await;

    let entries = run.activity.latest(100);
    assert_eq!(entries.len(), 20);

    let first_decision = entries.iter().position(|e| e.action.is_some());
    assert_eq!(first_decision, Some(13));
    assert!(entries[..13].iter().all(|e| e.rsi.is_none() && e.action.is_none()));
    assert!(entries[13..].iter().all(|e| e.action == Some(Action::Buy)));

    let realized: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.realized)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(realized, vec![13]);
    assert_eq!(run.sink.placed.load(Ordering::SeqCst), 1);

    // most recent last
    assert_eq!(entries.last().unwrap().close, 119.0);
}

#[tokio::test]
async fn malformed_frame_does_not_stop_the_stream() {
    let mut frames: Vec<String> = (0..20).map(|i| kline(i, 100.0 + i as f64)).collect();
    let broken = kline(20, 120.0).replace(r#""c":"120","#, "");
    frames.insert(15, broken);
    frames.insert(3, "not even json".to_string());
    let run = run_scenario(frames, true, 100).await;

    assert_eq!(run.activity.len(), 20);
    assert_eq!(run.sink.placed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn disabled_trading_only_logs() {
    let frames = (0..20).map(|i| kline(i, 100.0 + i as f64)).collect();
    let run = run_scenario(frames, false, 100).await;

    assert_eq!(run.activity.len(), 20);
    assert!(run.activity.latest(100).iter().all(|e| !e.realized));
    assert_eq!(run.sink.placed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn activity_is_capped_at_capacity() {
    let frames = (0..20).map(|i| kline(i, 100.0 + i as f64)).collect();
    let run = run_scenario(frames, true, 8).await;

    let entries = run.activity.latest(100);
    assert_eq!(entries.len(), 8);
    let closes: Vec<f64> = entries.iter().map(|e| e.close).collect();
    assert_eq!(closes, (12..20).map(|i| 100.0 + i as f64).collect::<Vec<_>>());
}

#[tokio::test]
async fn hold_only_classifier_keeps_logging_without_orders() {
    let frames = (0..20).map(|i| kline(i, 100.0 + i as f64)).collect();
    let port = ClassifierPort::hold_only("no model available".into());
    let run = run_with(Arc::new(port), frames, true, 100).await;

    let entries = run.activity.latest(100);
    assert_eq!(entries.len(), 20);
    assert!(entries[..13].iter().all(|e| e.action.is_none()));
    assert!(entries[13..].iter().all(|e| e.action == Some(Action::Hold)));
    assert!(entries.iter().all(|e| !e.realized));
    assert_eq!(run.sink.placed.load(Ordering::SeqCst), 0);
}
