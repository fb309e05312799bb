use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, trace, warn};

use classifier::Classifier;
use common::{ActivityEntry, ActivityLog, Candle, Decision, Order, Result};
use indicators::{FeatureEngine, FeatureVector, IndicatorConfig};
use policy::{DecisionPolicy, PolicyOutcome};

use crate::binance::parse_kline;
use crate::config::StreamConfig;
use crate::recorder::Record;

/// Everything a pipeline shares with the rest of the process.
///
/// Cloned into every worker. The feature history is not in here; each
/// `Pipeline` owns its own.
#[derive(Clone)]
pub struct PipelineContext {
    pub classifier: Arc<dyn Classifier>,
    pub policy: Arc<DecisionPolicy>,
    pub activity: ActivityLog,
    pub activity_tx: broadcast::Sender<ActivityEntry>,
    pub order_tx: mpsc::Sender<Order>,
    pub record_tx: Option<mpsc::Sender<Record>>,
}

/// What one frame did to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Not a kline frame.
    Ignored,
    /// Kline for a candle that has not closed yet. No state touched.
    InProgress,
    /// Admitted, but the feature vector is not complete. Logged without a
    /// classification.
    WarmingUp(ActivityEntry),
    Decided {
        decision: Decision,
        outcome: PolicyOutcome,
    },
}

/// Per-stream decision pipeline: parse, closed filter, features, classify,
/// policy, then fan out to the order channel, activity log and recorder.
pub struct Pipeline {
    stream: StreamConfig,
    features: FeatureEngine,
    ctx: PipelineContext,
}

impl Pipeline {
    pub fn new(stream: StreamConfig, indicators: IndicatorConfig, ctx: PipelineContext) -> Self {
        Self {
            stream,
            features: FeatureEngine::new(indicators),
            ctx,
        }
    }

    pub fn stream(&self) -> &StreamConfig {
        &self.stream
    }

    /// Run one raw frame through the pipeline.
    ///
    /// Errors are per-frame: the frame is dropped and the pipeline state is
    /// as it was before the call.
    pub async fn handle_frame(&mut self, text: &str, now: DateTime<Utc>) -> Result<FrameOutcome> {
        let Some(event) = parse_kline(text)? else {
            trace!("Non-kline frame skipped");
            return Ok(FrameOutcome::Ignored);
        };

        if !event.symbol.eq_ignore_ascii_case(&self.stream.symbol)
            || event.interval != self.stream.interval
        {
            return Err(common::Error::MalformedEvent(format!(
                "frame for {}@{} on stream {}",
                event.symbol,
                event.interval,
                self.stream.key()
            )));
        }

        let Some(candle) = event.into_closed_candle() else {
            return Ok(FrameOutcome::InProgress);
        };
        self.handle_candle(candle, now).await
    }

    /// Admit one closed candle.
    pub async fn handle_candle(
        &mut self,
        candle: Candle,
        now: DateTime<Utc>,
    ) -> Result<FrameOutcome> {
        let features = self.features.push(&candle)?;
        self.record(Record::Candle(candle.clone()));
        self.record(Record::Indicators {
            symbol: self.stream.symbol.clone(),
            interval: self.stream.interval.clone(),
            features: features.clone(),
        });

        let rsi = match (features.is_complete(), features.rsi) {
            (true, Some(rsi)) => rsi,
            _ => {
                debug!(
                    symbol = %self.stream.symbol,
                    close = candle.close,
                    candles = self.features.count(),
                    "Feature vector incomplete, skipping classification"
                );
                let entry = self.entry(&candle, &features, None, false);
                self.publish(entry.clone());
                return Ok(FrameOutcome::WarmingUp(entry));
            }
        };

        let classification = self.ctx.classifier.classify(&features);
        let decision = Decision {
            timestamp: candle.open_time,
            symbol: self.stream.symbol.clone(),
            action: classification.action,
            confidence: classification.confidence,
            close: candle.close,
            rsi,
        };
        info!(
            symbol = %decision.symbol,
            close = decision.close,
            rsi = decision.rsi,
            action = %decision.action,
            confidence = ?decision.confidence,
            "Decision"
        );
        self.record(Record::Prediction {
            symbol: self.stream.symbol.clone(),
            interval: self.stream.interval.clone(),
            open_time: candle.open_time,
            action: decision.action,
            confidence: decision.confidence,
            model: self.ctx.classifier.name().to_string(),
        });

        let outcome = self
            .ctx
            .policy
            .evaluate(&decision, self.stream.quantity, now)
            .await;

        let realized = match &outcome {
            PolicyOutcome::Realize(order) => {
                self.submit(order.clone());
                true
            }
            PolicyOutcome::Skip(reason) => {
                debug!(symbol = %decision.symbol, %reason, "No action realized");
                false
            }
        };

        let entry = self.entry(&candle, &features, Some(decision.action), realized);
        self.publish(entry);
        Ok(FrameOutcome::Decided { decision, outcome })
    }

    fn entry(
        &self,
        candle: &Candle,
        features: &FeatureVector,
        action: Option<common::Action>,
        realized: bool,
    ) -> ActivityEntry {
        ActivityEntry {
            timestamp: candle.open_time,
            symbol: self.stream.symbol.clone(),
            close: candle.close,
            rsi: features.rsi,
            action,
            realized,
        }
    }

    fn publish(&self, entry: ActivityEntry) {
        self.ctx.activity.push(entry.clone());
        // no subscribers is fine
        let _ = self.ctx.activity_tx.send(entry);
    }

    fn submit(&self, order: Order) {
        if let Err(e) = self.ctx.order_tx.try_send(order) {
            let order = match e {
                mpsc::error::TrySendError::Full(o) | mpsc::error::TrySendError::Closed(o) => o,
            };
            error!(
                symbol = %order.symbol,
                side = %order.side,
                "Order executor unavailable, order dropped"
            );
        }
    }

    fn record(&self, record: Record) {
        if let Some(tx) = &self.ctx.record_tx {
            if tx.try_send(record).is_err() {
                warn!(symbol = %self.stream.symbol, "Recorder unavailable, record dropped");
            }
        }
    }
}
