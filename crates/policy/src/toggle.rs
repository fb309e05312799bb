use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use common::{Error, Result, TradingToggle};

/// `[toggle]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToggleConfig {
    pub path: PathBuf,
}

impl Default for ToggleConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("config/auto_trading_status.json"),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ToggleFile {
    #[serde(default)]
    enabled: bool,
}

/// Enable flag persisted as `{"enabled": true}` in a JSON file.
///
/// The file is read on every `is_enabled` call, so edits made by an operator
/// outside this process take effect on the next decision.
#[derive(Debug, Clone)]
pub struct JsonFileToggle {
    path: PathBuf,
}

impl JsonFileToggle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TradingToggle for JsonFileToggle {
    async fn is_enabled(&self) -> bool {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "Auto-trading config not found, defaulting to disabled");
                return false;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot read auto-trading config, defaulting to disabled");
                return false;
            }
        };
        match serde_json::from_str::<ToggleFile>(&raw) {
            Ok(file) => file.enabled,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Malformed auto-trading config, defaulting to disabled");
                false
            }
        }
    }

    async fn set_enabled(&self, enabled: bool) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(&ToggleFile { enabled })?;

        // readers never observe a half-written file
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::Config(format!("cannot persist {}: {e}", self.path.display())))?;

        info!(enabled, path = %self.path.display(), "Auto-trading toggle updated");
        Ok(())
    }
}

/// In-process flag, for tests and for running without a toggle file.
#[derive(Debug, Clone, Default)]
pub struct MemoryToggle {
    enabled: Arc<RwLock<bool>>,
}

impl MemoryToggle {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(RwLock::new(enabled)),
        }
    }

    pub async fn set(&self, enabled: bool) {
        *self.enabled.write().await = enabled;
    }
}

#[async_trait]
impl TradingToggle for MemoryToggle {
    async fn is_enabled(&self) -> bool {
        *self.enabled.read().await
    }

    async fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.set(enabled).await;
        Ok(())
    }
}
