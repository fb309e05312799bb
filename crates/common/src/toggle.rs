use async_trait::async_trait;

use crate::Result;

/// The externally controlled trading enable flag.
///
/// Readers must call `is_enabled` fresh before every realized action; the
/// value may be flipped by an operator at any time.
#[async_trait]
pub trait TradingToggle: Send + Sync {
    /// Current value. Sources that cannot be read report `false`.
    async fn is_enabled(&self) -> bool;

    async fn set_enabled(&self, enabled: bool) -> Result<()>;
}
