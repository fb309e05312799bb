pub mod binance;
pub mod config;
pub mod executor;
pub mod feed;
pub mod lifecycle;
pub mod pipeline;
pub mod recorder;

pub use binance::{parse_kline, BinanceKlineFeed};
pub use config::{ActivityConfig, FeedConfig, PipelineFileConfig, StreamConfig};
pub use executor::OrderExecutor;
pub use feed::{FrameStream, MarketFeed, ReplayFeed};
pub use lifecycle::{StreamController, WorkerHandle};
pub use pipeline::{FrameOutcome, Pipeline, PipelineContext};
pub use recorder::{Record, Recorder};
