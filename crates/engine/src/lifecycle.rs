use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use common::{Error, ErrorCategory, WorkerState};
use indicators::IndicatorConfig;

use crate::config::{FeedConfig, StreamConfig};
use crate::feed::{FrameStream, MarketFeed};
use crate::pipeline::{Pipeline, PipelineContext};

/// Cloneable handle to one running worker.
#[derive(Clone)]
pub struct WorkerHandle {
    key: String,
    stop_tx: Arc<watch::Sender<bool>>,
    state: Arc<RwLock<WorkerState>>,
    running: Arc<AtomicBool>,
    task: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl WorkerHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Ask the worker to close its connection. Returns immediately; no frame
    /// is admitted once the worker has observed the request.
    pub fn stop(&self) {
        info!(stream = %self.key, "Stop requested");
        // the worker may already be gone
        let _ = self.stop_tx.send(true);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for the worker task to exit. Later calls return at once.
    pub async fn join(&self) {
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(stream = %self.key, error = %e, "Feed worker task failed");
            }
        }
    }
}

/// Owns the worker for one (symbol, interval).
///
/// At most one worker is alive per controller. The cooldown timers, activity
/// log and toggle live in the shared `PipelineContext` and outlive workers;
/// the indicator history does not, every `start` begins from an empty window.
pub struct StreamController {
    stream: StreamConfig,
    indicators: IndicatorConfig,
    feed_cfg: FeedConfig,
    feed: Arc<dyn MarketFeed>,
    ctx: PipelineContext,
    running: Arc<AtomicBool>,
    state: Arc<RwLock<WorkerState>>,
    current: Mutex<Option<WorkerHandle>>,
}

impl StreamController {
    pub fn new(
        stream: StreamConfig,
        indicators: IndicatorConfig,
        feed_cfg: FeedConfig,
        feed: Arc<dyn MarketFeed>,
        ctx: PipelineContext,
    ) -> Self {
        Self {
            stream,
            indicators,
            feed_cfg,
            feed,
            ctx,
            running: Arc::new(AtomicBool::new(false)),
            state: Arc::new(RwLock::new(WorkerState::Stopped)),
            current: Mutex::new(None),
        }
    }

    pub fn stream(&self) -> &StreamConfig {
        &self.stream
    }

    pub fn key(&self) -> String {
        self.stream.key()
    }

    /// Spawn a worker. `None` when one is already running.
    pub fn start(&self) -> Option<WorkerHandle> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!(stream = %self.stream.key(), "Stream already running, start ignored");
            return None;
        }

        info!(stream = %self.stream.key(), "Starting feed worker");
        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = Worker {
            key: self.stream.key(),
            pipeline: Pipeline::new(self.stream.clone(), self.indicators.clone(), self.ctx.clone()),
            feed: self.feed.clone(),
            feed_cfg: self.feed_cfg.clone(),
            state: self.state.clone(),
            running: self.running.clone(),
            stop_rx,
        };

        let task = tokio::spawn(worker.run());
        let handle = WorkerHandle {
            key: self.stream.key(),
            stop_tx: Arc::new(stop_tx),
            state: self.state.clone(),
            running: self.running.clone(),
            task: Arc::new(tokio::sync::Mutex::new(Some(task))),
        };
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle.clone());
        Some(handle)
    }

    /// Signal the current worker to stop. Returns false when nothing was running.
    pub fn stop(&self) -> bool {
        let current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match current {
            Some(handle) if handle.is_running() => {
                handle.stop();
                true
            }
            _ => {
                debug!(stream = %self.stream.key(), "Stop ignored, stream not running");
                false
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle of the most recently started worker.
    pub fn handle(&self) -> Option<WorkerHandle> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Marks the stream stopped when the worker future goes away, including when
/// it is dropped after a panic.
struct ExitGuard {
    key: String,
    state: Arc<RwLock<WorkerState>>,
    running: Arc<AtomicBool>,
    clean: bool,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if !self.clean {
            error!(stream = %self.key, "Feed worker aborted, marking stream stopped");
        }
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = WorkerState::Stopped;
        self.running.store(false, Ordering::Release);
    }
}

enum StreamEnd {
    Stopped,
    Closed,
    Failed(Error),
}

struct Worker {
    key: String,
    pipeline: Pipeline,
    feed: Arc<dyn MarketFeed>,
    feed_cfg: FeedConfig,
    state: Arc<RwLock<WorkerState>>,
    running: Arc<AtomicBool>,
    stop_rx: watch::Receiver<bool>,
}

impl Worker {
    fn set_state(&self, state: WorkerState) {
        debug!(stream = %self.key, %state, "Worker state");
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn stop_requested(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Connect, stream, reconnect with backoff until stopped or out of retries.
    async fn run(mut self) {
        let mut exit = ExitGuard {
            key: self.key.clone(),
            state: self.state.clone(),
            running: self.running.clone(),
            clean: false,
        };
        let max_backoff = self.feed_cfg.max_backoff();
        let mut backoff = Duration::from_secs(1);
        let mut reconnects: u32 = 0;

        while !self.stop_requested() {
            self.set_state(WorkerState::Connecting);
            let symbol = self.pipeline.stream().symbol.clone();
            let interval = self.pipeline.stream().interval.clone();
            let feed = self.feed.clone();

            let connected = tokio::select! {
                biased;
                _ = self.stop_rx.changed() => break,
                result = feed.connect(&symbol, &interval) => result,
            };

            match connected {
                Ok(frames) => {
                    self.set_state(WorkerState::Streaming);
                    info!(stream = %self.key, "Streaming");
                    let (end, received) = self.consume(frames).await;
                    if received {
                        backoff = Duration::from_secs(1);
                        reconnects = 0;
                    }
                    match end {
                        StreamEnd::Stopped => break,
                        StreamEnd::Closed => info!(stream = %self.key, "Feed closed by remote"),
                        StreamEnd::Failed(e) => {
                            warn!(stream = %self.key, error = %e, "Feed connection lost")
                        }
                    }
                }
                Err(e) => warn!(stream = %self.key, error = %e, "Feed connection failed"),
            }

            if let Some(max) = self.feed_cfg.max_reconnects {
                if reconnects >= max {
                    warn!(stream = %self.key, reconnects, "Reconnect budget exhausted, stopping");
                    break;
                }
            }
            reconnects += 1;
            self.set_state(WorkerState::Connecting);
            info!(stream = %self.key, backoff = ?backoff, attempt = reconnects, "Reconnecting");
            tokio::select! {
                biased;
                _ = self.stop_rx.changed() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(max_backoff);
        }

        self.set_state(WorkerState::Closing);
        info!(stream = %self.key, "Feed worker stopped");
        exit.clean = true;
    }

    /// Drain one connection. The bool reports whether any frame arrived.
    async fn consume(&mut self, mut frames: FrameStream) -> (StreamEnd, bool) {
        let mut received = false;
        loop {
            let next = tokio::select! {
                biased;
                _ = self.stop_rx.changed() => return (StreamEnd::Stopped, received),
                next = frames.next() => next,
            };
            match next {
                None => return (StreamEnd::Closed, received),
                Some(Err(e)) => return (StreamEnd::Failed(e), received),
                Some(Ok(text)) => {
                    if self.stop_requested() {
                        return (StreamEnd::Stopped, received);
                    }
                    received = true;
                    self.process(&text).await;
                }
            }
        }
    }

    async fn process(&mut self, text: &str) {
        if let Err(e) = self.pipeline.handle_frame(text, Utc::now()).await {
            match (e.category(), &e) {
                (_, Error::DuplicateCandle(at)) => {
                    debug!(stream = %self.key, open_time = %at, "Duplicate candle dropped")
                }
                (ErrorCategory::Data, _) => {
                    warn!(stream = %self.key, error = %e, "Event dropped")
                }
                (ErrorCategory::Transport, _) => {
                    warn!(stream = %self.key, error = %e, "Transport error while processing event")
                }
                _ => error!(stream = %self.key, error = %e, "Event processing failed"),
            }
        }
    }
}
