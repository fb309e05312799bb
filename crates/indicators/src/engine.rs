use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::trace;

use common::{Candle, Error, Result};

use crate::config::IndicatorConfig;
use crate::features::{FeatureVector, RawIndicators};
use crate::indicators::{sma, Ema, MacdIndicator, MacdState, RsiIndicator};

/// Incremental indicator state for one (symbol, interval) stream.
///
/// Keeps running EMAs plus a bounded window of recent closes. For a strictly
/// increasing candle sequence, `push` returns exactly what `compute_features`
/// returns over the full history.
#[derive(Debug, Clone)]
pub struct FeatureEngine {
    cfg: IndicatorConfig,
    rsi: RsiIndicator,
    closes: VecDeque<f64>,
    capacity: usize,
    count: usize,
    last_open_time: Option<DateTime<Utc>>,
    ema_short: Ema,
    ema_long: Ema,
    macd: MacdState,
}

impl FeatureEngine {
    pub fn new(cfg: IndicatorConfig) -> Self {
        let capacity = cfg.history_len();
        let macd = MacdIndicator::new(cfg.macd_fast, cfg.macd_slow, cfg.macd_signal);
        Self {
            rsi: RsiIndicator::new(cfg.rsi_period),
            closes: VecDeque::with_capacity(capacity + 1),
            capacity,
            count: 0,
            last_open_time: None,
            ema_short: Ema::new(cfg.sma_short),
            ema_long: Ema::new(cfg.sma_long),
            macd: MacdState::new(&macd),
            cfg,
        }
    }

    /// Admit the next closed candle and return its feature vector.
    ///
    /// A candle with the same `open_time` as the last admitted one is a
    /// duplicate (`Error::DuplicateCandle`); an earlier one is rejected
    /// (`Error::OutOfOrder`). Neither changes any state.
    pub fn push(&mut self, candle: &Candle) -> Result<FeatureVector> {
        if let Some(last) = self.last_open_time {
            if candle.open_time == last {
                return Err(Error::DuplicateCandle(candle.open_time));
            }
            if candle.open_time < last {
                return Err(Error::OutOfOrder {
                    last,
                    got: candle.open_time,
                });
            }
        }

        self.last_open_time = Some(candle.open_time);
        self.count += 1;
        self.closes.push_back(candle.close);
        while self.closes.len() > self.capacity {
            self.closes.pop_front();
        }

        let macd = self.macd.update(candle.close);
        let ema_short = self.ema_short.update(candle.close);
        let ema_long = self.ema_long.update(candle.close);

        let closes = self.closes.make_contiguous();
        let values = RawIndicators {
            sma_short: sma(closes, self.cfg.sma_short),
            sma_long: sma(closes, self.cfg.sma_long),
            ema_short: Some(ema_short),
            ema_long: Some(ema_long),
            rsi: self.rsi.compute(closes),
            macd: Some(macd.macd),
            macd_signal: Some(macd.signal),
        };

        let features = FeatureVector::assemble(candle, self.count, &self.cfg, values);
        if !features.is_complete() {
            trace!(
                symbol = %candle.symbol,
                have = self.count,
                need = self.cfg.lookback(),
                "Indicator window warming up"
            );
        }
        Ok(features)
    }

    /// Candles admitted since construction.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::compute_features;
    use chrono::{Duration, TimeZone};

    fn candle(minute: i64, close: f64) -> Candle {
        Candle {
            symbol: "ETHUSDT".into(),
            interval: "1m".into(),
            open_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::minutes(minute),
            open: close,
            high: close,
            low: close,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn matches_batch_over_long_history() {
        let cfg = IndicatorConfig::default();
        let history: Vec<Candle> = (0..120)
            .map(|i| candle(i, 100.0 + (i as f64 * 0.3).sin() * 4.0 + i as f64 * 0.05))
            .collect();

        let mut engine = FeatureEngine::new(cfg.clone());
        for (i, c) in history.iter().enumerate() {
            let incremental = engine.push(c).unwrap();
            let batch = compute_features(&history, i, &cfg).unwrap();
            assert_eq!(incremental, batch, "mismatch at index {i}");
        }
    }

    #[test]
    fn duplicate_is_dropped_without_state_change() {
        let mut engine = FeatureEngine::new(IndicatorConfig::default());
        engine.push(&candle(0, 100.0)).unwrap();
        let err = engine.push(&candle(0, 250.0)).unwrap_err();
        assert!(matches!(err, Error::DuplicateCandle(_)));
        assert_eq!(engine.count(), 1);

        let next = engine.push(&candle(1, 101.0)).unwrap();
        assert_eq!(next.close, 101.0);
        assert_eq!(engine.count(), 2);
    }

    #[test]
    fn out_of_order_is_rejected() {
        let mut engine = FeatureEngine::new(IndicatorConfig::default());
        engine.push(&candle(5, 100.0)).unwrap();
        let err = engine.push(&candle(3, 99.0)).unwrap_err();
        assert!(matches!(err, Error::OutOfOrder { .. }));
        assert_eq!(engine.count(), 1);
    }

    #[test]
    fn warm_up_then_complete() {
        let mut engine = FeatureEngine::new(IndicatorConfig::default());
        for i in 0..13 {
            let fv = engine.push(&candle(i, 100.0 + i as f64)).unwrap();
            assert!(!fv.is_complete());
        }
        let fv = engine.push(&candle(13, 113.0)).unwrap();
        assert!(fv.is_complete());
    }
}
