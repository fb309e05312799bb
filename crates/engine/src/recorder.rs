use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use common::{Action, Candle, Fill, Result};
use indicators::FeatureVector;

/// One row for the optional persistence side channel.
#[derive(Debug, Clone)]
pub enum Record {
    Candle(Candle),
    Indicators {
        symbol: String,
        interval: String,
        features: FeatureVector,
    },
    Prediction {
        symbol: String,
        interval: String,
        open_time: DateTime<Utc>,
        action: Action,
        confidence: Option<f64>,
        model: String,
    },
    Trade(Fill),
}

/// Open (creating if needed) the SQLite database and run migrations.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .map_err(sqlx::Error::from)?;
    info!(url = %database_url, "Database ready");
    Ok(pool)
}

/// Drains the record channel into SQLite. Every failure is logged and the
/// record dropped; nothing is reported back to the sender.
pub struct Recorder {
    record_rx: mpsc::Receiver<Record>,
    db: SqlitePool,
}

impl Recorder {
    pub fn new(record_rx: mpsc::Receiver<Record>, db: SqlitePool) -> Self {
        Self { record_rx, db }
    }

    /// Run the recorder loop. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!("Recorder running");
        while let Some(record) = self.record_rx.recv().await {
            if let Err(e) = self.persist(&record).await {
                warn!(error = %e, kind = record.kind(), "Failed to persist record");
            }
        }
        debug!("Recorder: record channel closed");
    }

    pub async fn persist(&self, record: &Record) -> Result<()> {
        match record {
            Record::Candle(c) => {
                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO ohlcv_data
                        (symbol, interval, open_time, open, high, low, close, volume)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                )
                .bind(&c.symbol)
                .bind(&c.interval)
                .bind(c.open_time.to_rfc3339())
                .bind(c.open)
                .bind(c.high)
                .bind(c.low)
                .bind(c.close)
                .bind(c.volume)
                .execute(&self.db)
                .await?;
            }
            Record::Indicators {
                symbol,
                interval,
                features,
            } => {
                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO indicators
                        (symbol, interval, open_time, sma, ema, rsi, macd, macd_signal)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                )
                .bind(symbol)
                .bind(interval)
                .bind(features.open_time.to_rfc3339())
                .bind(features.sma_short)
                .bind(features.ema_short)
                .bind(features.rsi)
                .bind(features.macd)
                .bind(features.macd_signal)
                .execute(&self.db)
                .await?;
            }
            Record::Prediction {
                symbol,
                interval,
                open_time,
                action,
                confidence,
                model,
            } => {
                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO ml_predictions
                        (symbol, interval, open_time, prediction, confidence, model)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                )
                .bind(symbol)
                .bind(interval)
                .bind(open_time.to_rfc3339())
                .bind(action.label())
                .bind(*confidence)
                .bind(model)
                .execute(&self.db)
                .await?;
            }
            Record::Trade(fill) => {
                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO trades (id, timestamp, symbol, side, quantity, price)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                )
                .bind(&fill.order_id)
                .bind(fill.timestamp.to_rfc3339())
                .bind(&fill.symbol)
                .bind(fill.side.to_string())
                .bind(fill.quantity)
                .bind(fill.fill_price)
                .execute(&self.db)
                .await?;
            }
        }
        Ok(())
    }
}

impl Record {
    fn kind(&self) -> &'static str {
        match self {
            Record::Candle(_) => "candle",
            Record::Indicators { .. } => "indicators",
            Record::Prediction { .. } => "prediction",
            Record::Trade(_) => "trade",
        }
    }
}
