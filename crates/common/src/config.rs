use crate::{Error, Result};

/// Process-level settings loaded from environment variables at startup.
/// Pipeline tuning (streams, periods, cooldown) lives in the TOML file named
/// by `pipeline_config_path`.
#[derive(Debug, Clone)]
pub struct Config {
    // Pipeline config file path
    pub pipeline_config_path: String,

    // Dashboard / operator API
    pub dashboard_token: Option<String>,
    pub dashboard_port: u16,

    // Trade sink
    pub paper_slippage_bps: f64,
    pub trade_log_path: String,

    // Best-effort persistence. Disabled when unset.
    pub database_url: Option<String>,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        Ok(Config {
            pipeline_config_path: optional_env("PIPELINE_CONFIG_PATH")
                .unwrap_or_else(|| "config/pipeline.toml".to_string()),
            dashboard_token: optional_env("DASHBOARD_TOKEN").filter(|t| !t.is_empty()),
            dashboard_port: parsed_env("DASHBOARD_PORT")?.unwrap_or(8080),
            paper_slippage_bps: parsed_env("PAPER_SLIPPAGE_BPS")?.unwrap_or(10.0),
            trade_log_path: optional_env("TRADE_LOG_PATH")
                .unwrap_or_else(|| "data/trade_log.csv".to_string()),
            database_url: optional_env("DATABASE_URL").filter(|u| !u.is_empty()),
        })
    }

    /// The dashboard token, required once the operator API is enabled.
    pub fn require_dashboard_token(&self) -> Result<&str> {
        self.dashboard_token.as_deref().ok_or_else(|| {
            Error::Config(
                "DASHBOARD_TOKEN is not set. Set it in .env or run with --no-api.".into(),
            )
        })
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parsed_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match optional_env(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key} has an invalid value: '{raw}'"))),
    }
}
