use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use common::{Error, Fill, Order, OrderSide, Result, TradeSink};

/// Simulated trade sink.
///
/// Fills at the order's reference price with configurable slippage and
/// appends every fill to a CSV trade log. No real orders are ever sent.
pub struct PaperTradeSink {
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
    trade_log: Option<PathBuf>,
    log_lock: Mutex<()>,
}

#[derive(Debug, Serialize)]
struct TradeLogRow {
    timestamp: String,
    symbol: String,
    side: String,
    quantity: f64,
    price: f64,
}

impl PaperTradeSink {
    pub fn new(slippage_bps: f64) -> Self {
        info!(slippage_bps, "PaperTradeSink initialized");
        Self {
            slippage_bps,
            trade_log: None,
            log_lock: Mutex::new(()),
        }
    }

    /// Append fills to `path`, creating it and its parent directory on first use.
    pub fn with_trade_log(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!(path = %path.display(), "Trade log enabled");
        self.trade_log = Some(path);
        self
    }

    fn fill_price(&self, side: OrderSide, reference: f64) -> f64 {
        // buys pay more, sells receive less
        match side {
            OrderSide::Buy => reference * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => reference * (1.0 - self.slippage_bps / 10_000.0),
        }
    }

    async fn append_log(&self, path: &Path, fill: &Fill) -> Result<()> {
        let _guard = self.log_lock.lock().await;
        let path = path.to_path_buf();
        let row = TradeLogRow {
            timestamp: fill.timestamp.to_rfc3339(),
            symbol: fill.symbol.clone(),
            side: fill.side.to_string(),
            quantity: fill.quantity,
            price: fill.fill_price,
        };
        tokio::task::spawn_blocking(move || append_row(&path, &row))
            .await
            .map_err(|e| Error::Sink(format!("trade log writer failed: {e}")))?
    }
}

fn append_row(path: &Path, row: &TradeLogRow) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let write_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(write_header)
        .from_writer(file);
    writer
        .serialize(row)
        .map_err(|e| Error::Sink(format!("cannot write trade log {}: {e}", path.display())))?;
    writer.flush()?;
    Ok(())
}

#[async_trait]
impl TradeSink for PaperTradeSink {
    async fn place(&self, order: &Order) -> Result<Fill> {
        if !(order.reference_price.is_finite() && order.reference_price > 0.0) {
            return Err(Error::Sink(format!(
                "no usable reference price for {}: {}",
                order.symbol, order.reference_price
            )));
        }

        let fill_price = self.fill_price(order.side, order.reference_price);
        debug!(
            symbol = %order.symbol,
            side = %order.side,
            reference = order.reference_price,
            fill = fill_price,
            qty = order.quantity,
            "Paper fill simulated"
        );

        let fill = Fill {
            order_id: order.id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            fill_price,
            quantity: order.quantity,
            timestamp: Utc::now(),
        };

        if let Some(path) = &self.trade_log {
            self.append_log(path, &fill).await?;
            info!(symbol = %fill.symbol, side = %fill.side, qty = fill.quantity, "Trade logged");
        }

        Ok(fill)
    }
}
