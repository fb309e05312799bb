use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::Candle;

use crate::config::IndicatorConfig;
use crate::indicators::{ema_series, sma, MacdIndicator, RsiIndicator};

/// Named input of a feature vector. Model artifacts list their inputs by
/// these names, in the order the model was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Open,
    High,
    Low,
    Close,
    Volume,
    SmaShort,
    SmaLong,
    EmaShort,
    EmaLong,
    Rsi,
    Macd,
    MacdSignal,
}

impl Feature {
    pub const ALL: [Feature; 12] = [
        Feature::Open,
        Feature::High,
        Feature::Low,
        Feature::Close,
        Feature::Volume,
        Feature::SmaShort,
        Feature::SmaLong,
        Feature::EmaShort,
        Feature::EmaLong,
        Feature::Rsi,
        Feature::Macd,
        Feature::MacdSignal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Feature::Open => "open",
            Feature::High => "high",
            Feature::Low => "low",
            Feature::Close => "close",
            Feature::Volume => "volume",
            Feature::SmaShort => "sma_short",
            Feature::SmaLong => "sma_long",
            Feature::EmaShort => "ema_short",
            Feature::EmaLong => "ema_long",
            Feature::Rsi => "rsi",
            Feature::Macd => "macd",
            Feature::MacdSignal => "macd_signal",
        }
    }
}

impl FromStr for Feature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Column names used by the training notebooks are accepted as aliases.
        let feature = match s {
            "sma_10" => Feature::SmaShort,
            "sma_50" => Feature::SmaLong,
            "ema_10" => Feature::EmaShort,
            "ema_50" => Feature::EmaLong,
            "signal_line" => Feature::MacdSignal,
            other => *Feature::ALL
                .iter()
                .find(|f| f.as_str() == other)
                .ok_or_else(|| format!("unknown feature '{other}'"))?,
        };
        Ok(feature)
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Technical features for one candle. Indicator fields are `None` until the
/// trailing history is long enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub sma_short: Option<f64>,
    pub sma_long: Option<f64>,
    pub ema_short: Option<f64>,
    pub ema_long: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
}

impl FeatureVector {
    /// True when every required field (short SMA, oscillator, MACD line) is
    /// present. Incomplete vectors must not reach a classifier.
    pub fn is_complete(&self) -> bool {
        self.sma_short.is_some() && self.rsi.is_some() && self.macd.is_some()
    }

    pub fn get(&self, feature: Feature) -> Option<f64> {
        match feature {
            Feature::Open => Some(self.open),
            Feature::High => Some(self.high),
            Feature::Low => Some(self.low),
            Feature::Close => Some(self.close),
            Feature::Volume => Some(self.volume),
            Feature::SmaShort => self.sma_short,
            Feature::SmaLong => self.sma_long,
            Feature::EmaShort => self.ema_short,
            Feature::EmaLong => self.ema_long,
            Feature::Rsi => self.rsi,
            Feature::Macd => self.macd,
            Feature::MacdSignal => self.macd_signal,
        }
    }

    /// Values for `features` in order, or `None` if any is missing.
    pub fn select(&self, features: &[Feature]) -> Option<Vec<f64>> {
        features.iter().map(|&f| self.get(f)).collect()
    }

    /// Assemble a vector from indicator values that are already computed.
    /// `count` is the number of candles seen so far, including `candle`.
    pub(crate) fn assemble(
        candle: &Candle,
        count: usize,
        cfg: &IndicatorConfig,
        values: RawIndicators,
    ) -> Self {
        let warmed_up = count >= cfg.lookback();
        let long_ready = count >= cfg.sma_long;
        Self {
            open_time: candle.open_time,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
            sma_short: values.sma_short,
            sma_long: values.sma_long,
            ema_short: values.ema_short.filter(|_| warmed_up),
            ema_long: values.ema_long.filter(|_| long_ready),
            rsi: values.rsi.filter(|_| warmed_up),
            macd: values.macd.filter(|_| warmed_up),
            macd_signal: values.macd_signal.filter(|_| warmed_up),
        }
    }
}

/// Ungated indicator values at one candle.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RawIndicators {
    pub sma_short: Option<f64>,
    pub sma_long: Option<f64>,
    pub ema_short: Option<f64>,
    pub ema_long: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
}

/// Compute the feature vector of `window[as_of]` from `window[..=as_of]`.
///
/// `window` must be ordered by strictly increasing `open_time`, and its first
/// element is treated as the first candle of the stream (EMA seeds, zero first
/// delta). Returns `None` if `as_of` is out of range.
pub fn compute_features(
    window: &[Candle],
    as_of: usize,
    cfg: &IndicatorConfig,
) -> Option<FeatureVector> {
    let history = window.get(..=as_of)?;
    let candle = history.last()?;
    let closes: Vec<f64> = history.iter().map(|c| c.close).collect();

    let macd = MacdIndicator::new(cfg.macd_fast, cfg.macd_slow, cfg.macd_signal).compute(&closes);
    let values = RawIndicators {
        sma_short: sma(&closes, cfg.sma_short),
        sma_long: sma(&closes, cfg.sma_long),
        ema_short: ema_series(&closes, cfg.sma_short).last().copied(),
        ema_long: ema_series(&closes, cfg.sma_long).last().copied(),
        rsi: RsiIndicator::new(cfg.rsi_period).compute(&closes),
        macd: macd.map(|m| m.macd),
        macd_signal: macd.map(|m| m.signal),
    };

    Some(FeatureVector::assemble(candle, history.len(), cfg, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn candles(closes: &[f64]) -> Vec<Candle> {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                symbol: "BTCUSDT".into(),
                interval: "1m".into(),
                open_time: start + Duration::minutes(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn short_history_has_null_indicators() {
        let cfg = IndicatorConfig::default();
        let window = candles(&(0..13).map(|i| 100.0 + i as f64).collect::<Vec<_>>());
        for as_of in 0..window.len() {
            let fv = compute_features(&window, as_of, &cfg).unwrap();
            assert!(fv.rsi.is_none(), "rsi defined at {as_of}");
            assert!(fv.macd.is_none(), "macd defined at {as_of}");
            assert!(fv.macd_signal.is_none());
            assert!(!fv.is_complete());
        }
    }

    #[test]
    fn first_complete_vector_at_lookback() {
        let cfg = IndicatorConfig::default();
        let window = candles(&(0..20).map(|i| 100.0 + i as f64).collect::<Vec<_>>());
        let first = (0..window.len())
            .find(|&i| compute_features(&window, i, &cfg).unwrap().is_complete())
            .unwrap();
        assert_eq!(first, 13);

        let fv = compute_features(&window, 13, &cfg).unwrap();
        assert!(fv.sma_long.is_none(), "long SMA needs 50 candles");
        assert!(fv.rsi.unwrap() > 99.999 && fv.rsi.unwrap() < 100.0);
    }

    #[test]
    fn single_candle_ema_equals_close() {
        let cfg = IndicatorConfig {
            sma_short: 1,
            rsi_period: 1,
            ..IndicatorConfig::default()
        };
        let window = candles(&[123.5]);
        let fv = compute_features(&window, 0, &cfg).unwrap();
        assert_eq!(fv.ema_short, Some(123.5));
        assert_eq!(fv.macd, Some(0.0));
    }

    #[test]
    fn as_of_out_of_range_is_none() {
        let window = candles(&[1.0, 2.0]);
        assert!(compute_features(&window, 2, &IndicatorConfig::default()).is_none());
        assert!(compute_features(&[], 0, &IndicatorConfig::default()).is_none());
    }

    #[test]
    fn as_of_ignores_later_candles() {
        let cfg = IndicatorConfig::default();
        let mut closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let window = candles(&closes);
        let a = compute_features(&window, 20, &cfg).unwrap();
        closes.truncate(21);
        let b = compute_features(&candles(&closes), 20, &cfg).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn feature_names_and_aliases() {
        assert_eq!("rsi".parse::<Feature>().unwrap(), Feature::Rsi);
        assert_eq!("sma_10".parse::<Feature>().unwrap(), Feature::SmaShort);
        assert_eq!("signal_line".parse::<Feature>().unwrap(), Feature::MacdSignal);
        assert!("bollinger_upper".parse::<Feature>().is_err());
        for f in Feature::ALL {
            assert_eq!(f.as_str().parse::<Feature>().unwrap(), f);
        }
    }

    #[test]
    fn select_fails_on_missing_feature() {
        let cfg = IndicatorConfig::default();
        let window = candles(&(0..20).map(|i| 100.0 + i as f64).collect::<Vec<_>>());
        let fv = compute_features(&window, 19, &cfg).unwrap();
        assert!(fv.select(&[Feature::Close, Feature::Rsi]).is_some());
        assert!(fv.select(&[Feature::Close, Feature::SmaLong]).is_none());
    }
}
