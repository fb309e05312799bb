use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw kline event as delivered by the market data stream.
/// Emitted on every kline update; only events with `is_closed == true`
/// are admitted to the decision pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlineEvent {
    pub symbol: String,
    pub interval: String,
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// True when the candle has closed (finalized).
    pub is_closed: bool,
}

impl KlineEvent {
    /// Convert into a `Candle`. Returns `None` for in-progress candles.
    pub fn into_closed_candle(self) -> Option<Candle> {
        if !self.is_closed {
            return None;
        }
        Some(Candle {
            symbol: self.symbol,
            interval: self.interval,
            open_time: self.open_time,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        })
    }
}

/// One closed OHLCV bar. Immutable once emitted by the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub interval: String,
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Classifier output for one candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    /// Integer label used by the training pipeline (1 = buy, -1 = sell, 0 = hold).
    pub fn label(self) -> i64 {
        match self {
            Action::Buy => 1,
            Action::Sell => -1,
            Action::Hold => 0,
        }
    }

    pub fn from_label(label: i64) -> Option<Self> {
        match label {
            1 => Some(Action::Buy),
            -1 => Some(Action::Sell),
            0 => Some(Action::Hold),
            _ => None,
        }
    }

    /// The order side this action would realize, if any.
    pub fn side(self) -> Option<OrderSide> {
        match self {
            Action::Buy => Some(OrderSide::Buy),
            Action::Sell => Some(OrderSide::Sell),
            Action::Hold => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Buy => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
            Action::Hold => write!(f, "HOLD"),
        }
    }
}

/// One classified candle. Produced for every admitted candle that has a
/// complete feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub action: Action,
    pub confidence: Option<f64>,
    pub close: f64,
    pub rsi: f64,
}

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// A realized trade action handed to the trade sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    /// Close of the candle that triggered the order. Simulated sinks fill
    /// against this price.
    pub reference_price: f64,
    pub decided_at: DateTime<Utc>,
}

impl Order {
    pub fn market(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: f64,
        reference_price: f64,
        decided_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            quantity,
            reference_price,
            decided_at,
        }
    }
}

/// Confirmation returned by a trade sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub fill_price: f64,
    pub quantity: f64,
    pub timestamp: DateTime<Utc>,
}

/// One row of the recent-activity ring buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub close: f64,
    /// `None` while the oscillator is still warming up.
    pub rsi: Option<f64>,
    /// `None` when no classification was attempted.
    pub action: Option<Action>,
    /// True when the decision policy realized an order for this candle.
    pub realized: bool,
}

/// Lifecycle of a live feed worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    #[default]
    Stopped,
    Connecting,
    Streaming,
    Closing,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Stopped => write!(f, "stopped"),
            WorkerState::Connecting => write!(f, "connecting"),
            WorkerState::Streaming => write!(f, "streaming"),
            WorkerState::Closing => write!(f, "closing"),
        }
    }
}
