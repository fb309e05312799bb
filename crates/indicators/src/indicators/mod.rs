pub mod macd;
pub mod moving_average;
pub mod rsi;

pub use macd::{MacdIndicator, MacdState, MacdValue};
pub use moving_average::{ema_series, sma, Ema};
pub use rsi::{RsiIndicator, RSI_EPSILON};
