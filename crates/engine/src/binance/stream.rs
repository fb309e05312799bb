use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};
use url::Url;

use common::{Error, KlineEvent, Result};

use crate::feed::{FrameStream, MarketFeed};

pub const BINANCE_WS_BASE: &str = "wss://stream.binance.com:9443/ws";

/// Binance kline/candlestick WebSocket stream.
///
/// Subscribes to `{symbol}@kline_{interval}` and yields the raw text frames.
/// Ping, pong and binary frames are dropped here.
#[derive(Debug, Clone)]
pub struct BinanceKlineFeed {
    base_url: String,
}

impl Default for BinanceKlineFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl BinanceKlineFeed {
    pub fn new() -> Self {
        Self::with_base_url(BINANCE_WS_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn stream_url(&self, symbol: &str, interval: &str) -> Result<Url> {
        let url_str = format!(
            "{}/{}@kline_{}",
            self.base_url,
            symbol.to_lowercase(),
            interval
        );
        Url::parse(&url_str).map_err(|e| Error::WebSocket(e.to_string()))
    }
}

#[async_trait]
impl MarketFeed for BinanceKlineFeed {
    async fn connect(&self, symbol: &str, interval: &str) -> Result<FrameStream> {
        let url = self.stream_url(symbol, interval)?;
        info!(%url, "Connecting to Binance WebSocket stream");

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;

        let (_, read) = ws_stream.split();
        let frames = read
            .take_while(|msg| futures_util::future::ready(!matches!(msg, Ok(Message::Close(_)))))
            .filter_map(|msg| async move {
                match msg {
                    Ok(Message::Text(text)) => Some(Ok(text)),
                    Ok(other) => {
                        debug!(kind = ?message_kind(&other), "Ignoring non-text frame");
                        None
                    }
                    Err(e) => Some(Err(Error::WebSocket(e.to_string()))),
                }
            });
        Ok(frames.boxed())
    }
}

fn message_kind(msg: &Message) -> &'static str {
    match msg {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "frame",
    }
}

// ─── Binance kline JSON parsing ──────────────────────────────────────────────

#[derive(Deserialize)]
struct KlineWrapper {
    #[serde(rename = "s")]
    symbol: String,
    k: KlineData,
}

#[derive(Deserialize)]
struct KlineData {
    #[serde(rename = "t")]
    open_time_ms: i64,
    #[serde(rename = "i")]
    interval: String,
    #[serde(rename = "o")]
    open: Number,
    #[serde(rename = "h")]
    high: Number,
    #[serde(rename = "l")]
    low: Number,
    #[serde(rename = "c")]
    close: Number,
    #[serde(rename = "v")]
    volume: Number,
    #[serde(rename = "x")]
    is_closed: bool,
}

/// Binance sends prices as strings; recorded frames may carry plain numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum Number {
    Text(String),
    Float(f64),
}

impl Number {
    fn value(&self, field: &str) -> Result<f64> {
        let v = match self {
            Number::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| Error::MalformedEvent(format!("{field} is not numeric: {s:?}")))?,
            Number::Float(v) => *v,
        };
        if !v.is_finite() || v < 0.0 {
            return Err(Error::MalformedEvent(format!("{field} out of range: {v}")));
        }
        Ok(v)
    }
}

/// Parse one frame into a kline event.
///
/// Frames whose `e` is not `"kline"` yield `Ok(None)`. Combined-stream
/// envelopes (`{"stream": .., "data": {..}}`) are unwrapped. A kline frame
/// with a missing or out-of-range field is `Error::MalformedEvent`.
pub fn parse_kline(text: &str) -> Result<Option<KlineEvent>> {
    let mut value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| Error::MalformedEvent(format!("not JSON: {e}")))?;
    if let Some(data) = value.get_mut("data").map(serde_json::Value::take) {
        value = data;
    }
    if value.get("e").and_then(|v| v.as_str()) != Some("kline") {
        return Ok(None);
    }

    let kline: KlineWrapper =
        serde_json::from_value(value).map_err(|e| Error::MalformedEvent(e.to_string()))?;
    let k = kline.k;

    let open_time: DateTime<Utc> = Utc
        .timestamp_millis_opt(k.open_time_ms)
        .single()
        .ok_or_else(|| Error::MalformedEvent(format!("invalid open time {}", k.open_time_ms)))?;

    Ok(Some(KlineEvent {
        symbol: kline.symbol,
        interval: k.interval,
        open_time,
        open: k.open.value("open")?,
        high: k.high.value("high")?,
        low: k.low.value("low")?,
        close: k.close.value("close")?,
        volume: k.volume.value("volume")?,
        is_closed: k.is_closed,
    }))
}
