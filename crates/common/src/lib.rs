pub mod activity;
pub mod config;
pub mod error;
pub mod sink;
pub mod toggle;
pub mod types;

pub use activity::ActivityLog;
pub use config::Config;
pub use error::{Error, ErrorCategory, Result};
pub use sink::TradeSink;
pub use toggle::TradingToggle;
pub use types::*;
