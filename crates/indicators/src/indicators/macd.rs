use serde::{Deserialize, Serialize};

use super::moving_average::{ema_series, Ema};

/// MACD (Moving Average Convergence/Divergence) indicator.
///
/// Computes: MACD line = EMA(fast) − EMA(slow), Signal = EMA(macd_line, signal).
/// All three EMAs use bootstrap seeding, so a value exists from the first close.
#[derive(Debug, Clone)]
pub struct MacdIndicator {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

/// One MACD observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdValue {
    pub macd: f64,
    pub signal: f64,
}

impl MacdValue {
    pub fn histogram(&self) -> f64 {
        self.macd - self.signal
    }
}

impl MacdIndicator {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast < slow, "MACD fast period must be less than slow period");
        Self { fast, slow, signal }
    }

    /// MACD series over close prices (oldest first), one value per close.
    pub fn series(&self, closes: &[f64]) -> Vec<MacdValue> {
        let fast = ema_series(closes, self.fast);
        let slow = ema_series(closes, self.slow);
        let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal = ema_series(&line, self.signal);
        line.into_iter()
            .zip(signal)
            .map(|(macd, signal)| MacdValue { macd, signal })
            .collect()
    }

    /// MACD at the last close. `None` for an empty input.
    pub fn compute(&self, closes: &[f64]) -> Option<MacdValue> {
        self.series(closes).last().copied()
    }
}

/// Incremental MACD state, one `update` per close.
#[derive(Debug, Clone)]
pub struct MacdState {
    fast: Ema,
    slow: Ema,
    signal: Ema,
}

impl MacdState {
    pub fn new(indicator: &MacdIndicator) -> Self {
        Self {
            fast: Ema::new(indicator.fast),
            slow: Ema::new(indicator.slow),
            signal: Ema::new(indicator.signal),
        }
    }

    pub fn update(&mut self, close: f64) -> MacdValue {
        let macd = self.fast.update(close) - self.slow.update(close);
        let signal = self.signal.update(macd);
        MacdValue { macd, signal }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trending_up(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64 * 0.5).collect()
    }

    #[test]
    fn macd_is_zero_on_first_close() {
        let macd = MacdIndicator::new(12, 26, 9);
        let value = macd.compute(&[100.0]).unwrap();
        assert_eq!(value.macd, 0.0);
        assert_eq!(value.signal, 0.0);
    }

    #[test]
    fn macd_returns_none_for_empty_input() {
        let macd = MacdIndicator::new(12, 26, 9);
        assert!(macd.compute(&[]).is_none());
    }

    #[test]
    fn macd_positive_on_steady_uptrend() {
        let macd = MacdIndicator::new(12, 26, 9);
        let value = macd.compute(&trending_up(60)).unwrap();
        assert!(value.macd > 0.0);
        // the signal line lags the MACD line in a steady trend
        assert!(value.histogram() > 0.0);
    }

    #[test]
    fn incremental_state_matches_series() {
        let macd = MacdIndicator::new(3, 6, 3);
        let mut prices: Vec<f64> = (0..20).map(|i| 100.0 - i as f64 * 0.5).collect();
        prices.extend((0..20).map(|i| 90.0 + i as f64 * 2.0));

        let series = macd.series(&prices);
        let mut state = MacdState::new(&macd);
        for (i, &p) in prices.iter().enumerate() {
            assert_eq!(state.update(p), series[i]);
        }
    }

    #[test]
    #[should_panic(expected = "fast period must be less than slow")]
    fn macd_rejects_inverted_periods() {
        MacdIndicator::new(26, 12, 9);
    }
}
