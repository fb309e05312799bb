use async_trait::async_trait;

use crate::{Fill, Order, Result};

/// Destination for realized trade actions.
///
/// `PaperTradeSink` implements this for simulation. Only `OrderExecutor` in
/// `crates/engine` should call `place`; every order must come out of the
/// Decision Policy first.
#[async_trait]
pub trait TradeSink: Send + Sync {
    /// Record or execute the order. Failures are logged by the caller and
    /// never retried.
    async fn place(&self, order: &Order) -> Result<Fill>;
}
