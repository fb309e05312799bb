/// Added to the average loss before dividing. With no losses in the window the
/// oscillator therefore lands a hair below 100 instead of exactly 100; models
/// downstream were trained against this convention, keep it.
pub const RSI_EPSILON: f64 = 1e-10;

/// RSI-style momentum oscillator over simple rolling means.
///
/// Gains and losses are the positive and negative close-to-close deltas,
/// zero-filled for the opposite sign. Both are averaged with a plain mean over
/// the trailing `period` deltas (not Wilder smoothing). The first close of the
/// input has no predecessor and contributes a zero delta, so a value is
/// available once `period` closes exist.
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    pub period: usize,
}

impl RsiIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self { period }
    }

    /// Oscillator value at the last close (oldest first).
    /// Returns `None` if there are fewer than `period` values.
    ///
    /// `closes[0]` is treated as the first candle of the stream. Callers
    /// holding a truncated history must pass at least `period + 1` closes so
    /// every delta in the window is real.
    pub fn compute(&self, closes: &[f64]) -> Option<f64> {
        if closes.len() < self.period {
            return None;
        }

        let start = closes.len() - self.period;
        let mut gain_sum = 0.0;
        let mut loss_sum = 0.0;
        for i in start..closes.len() {
            let delta = if i == 0 { 0.0 } else { closes[i] - closes[i - 1] };
            if delta > 0.0 {
                gain_sum += delta;
            } else if delta < 0.0 {
                loss_sum += -delta;
            }
        }

        let avg_gain = gain_sum / self.period as f64;
        let avg_loss = loss_sum / self.period as f64;
        let rs = avg_gain / (avg_loss + RSI_EPSILON);
        Some(100.0 - 100.0 / (1.0 + rs))
    }
}
