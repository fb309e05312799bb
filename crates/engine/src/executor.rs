use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use common::{Order, TradeSink};

use crate::recorder::Record;

/// Receives realized orders from the pipelines and hands them to the trade
/// sink. Sink failures are logged and never retried.
///
/// This is the ONLY component that calls `TradeSink::place`.
pub struct OrderExecutor {
    order_rx: mpsc::Receiver<Order>,
    sink: Arc<dyn TradeSink>,
    record_tx: Option<mpsc::Sender<Record>>,
}

impl OrderExecutor {
    pub fn new(order_rx: mpsc::Receiver<Order>, sink: Arc<dyn TradeSink>) -> Self {
        Self {
            order_rx,
            sink,
            record_tx: None,
        }
    }

    /// Forward fills to the recorder.
    pub fn with_recorder(mut self, record_tx: mpsc::Sender<Record>) -> Self {
        self.record_tx = Some(record_tx);
        self
    }

    /// Run the executor loop. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!("OrderExecutor running");
        while let Some(order) = self.order_rx.recv().await {
            info!(symbol = %order.symbol, side = %order.side, qty = order.quantity, "Executing order");

            match self.sink.place(&order).await {
                Ok(fill) => {
                    info!(
                        symbol = %fill.symbol,
                        side = %fill.side,
                        price = fill.fill_price,
                        qty = fill.quantity,
                        "Order filled"
                    );
                    if let Some(tx) = &self.record_tx {
                        if tx.try_send(Record::Trade(fill)).is_err() {
                            warn!("Recorder unavailable, fill not persisted");
                        }
                    }
                }
                Err(e) => {
                    error!(symbol = %order.symbol, side = %order.side, error = %e, "Order placement failed");
                }
            }
        }
        warn!("OrderExecutor: order channel closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use common::{Error, Fill, OrderSide, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl TradeSink for CountingSink {
        async fn place(&self, order: &Order) -> Result<Fill> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Sink("exchange unreachable".into()));
            }
            Ok(Fill {
                order_id: order.id.clone(),
                symbol: order.symbol.clone(),
                side: order.side,
                fill_price: order.reference_price,
                quantity: order.quantity,
                timestamp: Utc::now(),
            })
        }
    }

    fn order() -> Order {
        Order::market("BTCUSDT", OrderSide::Buy, 0.5, 100.0, Utc::now())
    }

    #[tokio::test]
    async fn fills_are_forwarded_to_recorder() {
        let sink = Arc::new(CountingSink {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let (order_tx, order_rx) = mpsc::channel(4);
        let (record_tx, mut record_rx) = mpsc::channel(4);
        let handle = tokio::spawn(
            OrderExecutor::new(order_rx, sink.clone())
                .with_recorder(record_tx)
                .run(),
        );

        let sent = order();
        order_tx.send(sent.clone()).await.unwrap();
        drop(order_tx);
        handle.await.unwrap();

        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        match record_rx.recv().await {
            Some(Record::Trade(fill)) => assert_eq!(fill.order_id, sent.id),
            other => panic!("expected trade record, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failures_are_not_retried() {
        let sink = Arc::new(CountingSink {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let (order_tx, order_rx) = mpsc::channel(4);
        let handle = tokio::spawn(OrderExecutor::new(order_rx, sink.clone()).run());

        order_tx.send(order()).await.unwrap();
        order_tx.send(order()).await.unwrap();
        drop(order_tx);
        handle.await.unwrap();

        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    }
}
