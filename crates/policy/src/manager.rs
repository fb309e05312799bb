use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use common::{Decision, Error, Order, Result, TradingToggle};

const GLOBAL_KEY: &str = "*";

/// Largest cooldown a `chrono::Duration` can hold.
pub const MAX_COOLDOWN_SECS: u64 = (i64::MAX / 1_000) as u64;

/// Whether symbols share one cooldown timer or each get their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownScope {
    #[default]
    Global,
    PerSymbol,
}

/// User-configurable policy parameters, the `[policy]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Minimum seconds between two realized actions under the same cooldown key.
    pub cooldown_secs: u64,
    pub cooldown_scope: CooldownScope,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 300,
            cooldown_scope: CooldownScope::Global,
        }
    }
}

impl PolicyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cooldown_secs > MAX_COOLDOWN_SECS {
            return Err(Error::Config(format!(
                "policy.cooldown_secs must be at most {MAX_COOLDOWN_SECS}, got {}",
                self.cooldown_secs
            )));
        }
        Ok(())
    }
}

/// Why a decision did not turn into an order.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Hold,
    Disabled,
    Cooldown { remaining: Duration },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Hold => write!(f, "hold"),
            SkipReason::Disabled => write!(f, "auto-trading disabled"),
            SkipReason::Cooldown { remaining } => {
                write!(f, "cooldown in effect ({}s left)", remaining.num_seconds())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PolicyOutcome {
    Realize(Order),
    Skip(SkipReason),
}

/// Observable state of one cooldown key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownState {
    Idle,
    Cooldown { remaining: Duration },
}

/// The gatekeeper between the classifier and the trade sink.
///
/// Every Buy/Sell decision passes through `evaluate`. The policy re-reads the
/// enable toggle on each call and owns the cooldown timers; the transition
/// back to IDLE is implicit, computed from elapsed time on the next call.
pub struct DecisionPolicy {
    config: PolicyConfig,
    toggle: Arc<dyn TradingToggle>,
    last_action: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl DecisionPolicy {
    pub fn new(config: PolicyConfig, toggle: Arc<dyn TradingToggle>) -> Self {
        info!(
            cooldown_secs = config.cooldown_secs,
            scope = ?config.cooldown_scope,
            "DecisionPolicy initialized"
        );
        Self {
            config,
            toggle,
            last_action: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn toggle(&self) -> &Arc<dyn TradingToggle> {
        &self.toggle
    }

    fn cooldown(&self) -> Duration {
        // validate() rejects larger values; clamp for configs built in code
        let secs = self.config.cooldown_secs.min(MAX_COOLDOWN_SECS);
        Duration::seconds(secs as i64)
    }

    fn key<'a>(&self, symbol: &'a str) -> &'a str {
        match self.config.cooldown_scope {
            CooldownScope::Global => GLOBAL_KEY,
            CooldownScope::PerSymbol => symbol,
        }
    }

    /// Decide whether `decision` is realized.
    ///
    /// On `Realize` the cooldown timer has already been stamped with `now`;
    /// a later sink failure does not undo it.
    pub async fn evaluate(
        &self,
        decision: &Decision,
        quantity: f64,
        now: DateTime<Utc>,
    ) -> PolicyOutcome {
        let Some(side) = decision.action.side() else {
            return PolicyOutcome::Skip(SkipReason::Hold);
        };

        if !self.toggle.is_enabled().await {
            info!(
                symbol = %decision.symbol,
                action = %decision.action,
                "Auto-trading disabled, signal logged only"
            );
            return PolicyOutcome::Skip(SkipReason::Disabled);
        }

        // Held across the check and the stamp so two evaluations on the same
        // key cannot both pass.
        let mut last_action = self.last_action.lock().await;
        let key = self.key(&decision.symbol);
        if let Some(&last) = last_action.get(key) {
            let elapsed = now - last;
            if elapsed < self.cooldown() {
                let remaining = self.cooldown() - elapsed;
                warn!(
                    symbol = %decision.symbol,
                    action = %decision.action,
                    remaining_secs = remaining.num_seconds(),
                    "Trade blocked: cooldown in effect"
                );
                return PolicyOutcome::Skip(SkipReason::Cooldown { remaining });
            }
        }
        last_action.insert(key.to_string(), now);
        drop(last_action);

        let order = Order::market(&decision.symbol, side, quantity, decision.close, now);
        info!(
            symbol = %order.symbol,
            side = %order.side,
            qty = order.quantity,
            price = order.reference_price,
            "Order approved by DecisionPolicy"
        );
        PolicyOutcome::Realize(order)
    }

    /// Cooldown state for `symbol` as of `now`.
    pub async fn cooldown_state(&self, symbol: &str, now: DateTime<Utc>) -> CooldownState {
        let last_action = self.last_action.lock().await;
        match last_action.get(self.key(symbol)) {
            Some(&last) if now - last < self.cooldown() => CooldownState::Cooldown {
                remaining: self.cooldown() - (now - last),
            },
            _ => CooldownState::Idle,
        }
    }

    /// Forget all cooldown timers.
    pub async fn reset(&self) {
        debug!("Cooldown timers cleared");
        self.last_action.lock().await.clear();
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
