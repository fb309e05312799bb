/// Arithmetic mean of the trailing `period` values.
/// Returns `None` until `period` values exist.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Running exponential moving average with bootstrap seeding.
///
/// `ema[t] = alpha * x[t] + (1 - alpha) * ema[t-1]`, `alpha = 2 / (period + 1)`,
/// and the first value equals the first input. This is not a windowed average:
/// no SMA seed, no warm-up discard.
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    value: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self {
            alpha: 2.0 / (period as f64 + 1.0),
            value: None,
        }
    }

    pub fn update(&mut self, x: f64) -> f64 {
        let next = match self.value {
            None => x,
            Some(prev) => self.alpha * x + (1.0 - self.alpha) * prev,
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

/// Full bootstrap-seeded EMA series over `values` (same length as input).
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut ema = Ema::new(period);
    values.iter().map(|&x| ema.update(x)).collect()
}
