pub mod config;
pub mod engine;
pub mod features;
pub mod indicators;

pub use config::IndicatorConfig;
pub use engine::FeatureEngine;
pub use features::{compute_features, Feature, FeatureVector};
