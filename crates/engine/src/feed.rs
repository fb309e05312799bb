use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};

use common::{Error, Result};

/// Raw text frames from a market data source.
pub type FrameStream = BoxStream<'static, Result<String>>;

/// Source of kline frames for one (symbol, interval) subscription.
///
/// `connect` establishes the subscription; the returned stream ends when the
/// remote side closes and yields `Err` on transport failure.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    async fn connect(&self, symbol: &str, interval: &str) -> Result<FrameStream>;
}

/// Plays back a fixed list of frames on every `connect`.
#[derive(Debug, Clone, Default)]
pub struct ReplayFeed {
    frames: Arc<Vec<String>>,
    delay: Option<Duration>,
}

impl ReplayFeed {
    pub fn new(frames: Vec<String>) -> Self {
        Self {
            frames: Arc::new(frames),
            delay: None,
        }
    }

    /// One JSON frame per line; blank lines are skipped.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read replay file '{}': {e}", path.display()))
        })?;
        let frames = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self::new(frames))
    }

    /// Pause before each frame.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[async_trait]
impl MarketFeed for ReplayFeed {
    async fn connect(&self, _symbol: &str, _interval: &str) -> Result<FrameStream> {
        let frames: Vec<String> = self.frames.as_ref().clone();
        let replay = stream::iter(frames.into_iter().map(Ok));
        match self.delay {
            Some(delay) => Ok(replay
                .then(move |frame| async move {
                    tokio::time::sleep(delay).await;
                    frame
                })
                .boxed()),
            None => Ok(replay.boxed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_every_frame_on_each_connect() {
        let feed = ReplayFeed::new(vec!["a".into(), "b".into()]);
        for _ in 0..2 {
            let frames: Vec<String> = feed
                .connect("BTCUSDT", "1m")
                .await
                .unwrap()
                .map(|f| f.unwrap())
                .collect()
                .await;
            assert_eq!(frames, vec!["a", "b"]);
        }
    }

    #[test]
    fn file_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.jsonl");
        std::fs::write(&path, "{\"e\":\"kline\"}\n\n  \n{\"e\":\"trade\"}\n").unwrap();
        let feed = ReplayFeed::from_file(&path).unwrap();
        assert_eq!(feed.len(), 2);
    }
}
