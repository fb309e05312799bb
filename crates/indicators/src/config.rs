use serde::{Deserialize, Serialize};

use common::{Error, Result};

/// Indicator periods, read from the `[indicators]` table of the pipeline file.
///
/// ```toml
/// [indicators]
/// sma_short = 10
/// sma_long = 50
/// rsi_period = 14
/// macd_fast = 12
/// macd_slow = 26
/// macd_signal = 9
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub sma_short: usize,
    pub sma_long: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            sma_short: 10,
            sma_long: 50,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
        }
    }
}

impl IndicatorConfig {
    pub fn validate(&self) -> Result<()> {
        let periods = [
            ("sma_short", self.sma_short),
            ("sma_long", self.sma_long),
            ("rsi_period", self.rsi_period),
            ("macd_fast", self.macd_fast),
            ("macd_slow", self.macd_slow),
            ("macd_signal", self.macd_signal),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, p)| *p == 0) {
            return Err(Error::Config(format!("indicators.{name} must be > 0")));
        }
        if self.macd_fast >= self.macd_slow {
            return Err(Error::Config(format!(
                "indicators.macd_fast ({}) must be less than macd_slow ({})",
                self.macd_fast, self.macd_slow
            )));
        }
        Ok(())
    }

    /// Candles needed before the required features (short SMA, oscillator,
    /// MACD line) are reported.
    pub fn lookback(&self) -> usize {
        self.rsi_period.max(self.sma_short)
    }

    /// Closes the incremental engine must retain.
    pub fn history_len(&self) -> usize {
        self.sma_short
            .max(self.sma_long)
            .max(self.rsi_period + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = IndicatorConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.lookback(), 14);
        assert_eq!(cfg.history_len(), 50);
    }

    #[test]
    fn rejects_zero_period() {
        let cfg = IndicatorConfig {
            rsi_period: 0,
            ..IndicatorConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_inverted_macd() {
        let cfg = IndicatorConfig {
            macd_fast: 26,
            macd_slow: 12,
            ..IndicatorConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_table_uses_defaults() {
        let cfg: IndicatorConfig = toml::from_str("rsi_period = 7").unwrap();
        assert_eq!(cfg.rsi_period, 7);
        assert_eq!(cfg.sma_short, 10);
    }
}
