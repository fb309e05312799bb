use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use classifier::ClassifierConfig;
use common::{ActivityLog, Error, Result};
use indicators::IndicatorConfig;
use policy::{PolicyConfig, ToggleConfig};

/// Top-level pipeline config file (TOML).
///
/// Example `config/pipeline.toml`:
/// ```toml
/// [[stream]]
/// symbol = "BTCUSDT"
/// interval = "1m"
/// quantity = 0.001
///
/// [policy]
/// cooldown_secs = 300
/// cooldown_scope = "global"
///
/// [classifier]
/// primary = "models/random_forest.json"
/// fallback = "models/linear.json"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineFileConfig {
    #[serde(rename = "stream")]
    pub streams: Vec<StreamConfig>,
    pub indicators: IndicatorConfig,
    pub policy: PolicyConfig,
    pub classifier: ClassifierConfig,
    pub activity: ActivityConfig,
    pub toggle: ToggleConfig,
    pub feed: FeedConfig,
}

/// One live feed and the order size used when its decisions are realized.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StreamConfig {
    /// Trading pair, e.g. "BTCUSDT".
    pub symbol: String,
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Order quantity in base asset units.
    #[serde(default = "default_quantity")]
    pub quantity: f64,
}

fn default_interval() -> String {
    "1m".to_string()
}

fn default_quantity() -> f64 {
    0.001
}

impl StreamConfig {
    pub fn new(symbol: impl Into<String>, interval: impl Into<String>, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            interval: interval.into(),
            quantity,
        }
    }

    /// `"BTCUSDT@1m"`, used in logs and as the stream key.
    pub fn key(&self) -> String {
        format!("{}@{}", self.symbol, self.interval)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ActivityConfig {
    pub capacity: usize,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            capacity: ActivityLog::DEFAULT_CAPACITY,
        }
    }
}

/// Reconnect behaviour of the live feed worker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedConfig {
    pub max_backoff_secs: u64,
    /// `None` retries forever, `Some(0)` never reconnects.
    pub max_reconnects: Option<u32>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_backoff_secs: 60,
            max_reconnects: None,
        }
    }
}

impl FeedConfig {
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs.max(1))
    }
}

impl PipelineFileConfig {
    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read pipeline config at '{}': {e}", path.display()))
        })?;
        let cfg = Self::from_toml(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
            other => other,
        })?;
        Ok(cfg)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.indicators.validate()?;
        self.policy.validate()?;
        if self.activity.capacity == 0 {
            return Err(Error::Config("activity.capacity must be at least 1".into()));
        }

        let mut seen = HashSet::new();
        for stream in &self.streams {
            if stream.symbol.trim().is_empty() {
                return Err(Error::Config("stream symbol must not be empty".into()));
            }
            if stream.interval.trim().is_empty() {
                return Err(Error::Config(format!(
                    "stream {} has an empty interval",
                    stream.symbol
                )));
            }
            if !(stream.quantity.is_finite() && stream.quantity > 0.0) {
                return Err(Error::Config(format!(
                    "stream {} quantity must be positive, got {}",
                    stream.key(),
                    stream.quantity
                )));
            }
            if !seen.insert(stream.key()) {
                return Err(Error::Config(format!("stream {} configured twice", stream.key())));
            }
        }
        Ok(())
    }
}
