pub mod stream;

pub use stream::{parse_kline, BinanceKlineFeed, BINANCE_WS_BASE};
