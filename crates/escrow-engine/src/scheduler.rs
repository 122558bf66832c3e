use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use uuid::Uuid;

use crate::engine::TradeEngine;

/// Bounded work queue feeding a fixed-size pool of workers that each call
/// [`TradeEngine::advance`] — SPEC_FULL.md's "added" note generalizing the
/// single-threaded poll loop implied by spec.md §4.6 into a worker pool so
/// one slow/stuck trade cannot starve the others (spec.md §5's concurrency
/// model).
#[derive(Debug, Clone)]
pub struct Scheduler {
    sender: mpsc::Sender<Uuid>,
}

impl Scheduler {
    /// Spawns `worker_count` tasks draining a shared bounded channel of
    /// trade ids, each calling `engine.advance(id)`. Returns the handle used
    /// to enqueue work and the `JoinSet` so the caller can await clean
    /// shutdown after cancelling `cancel`.
    pub fn spawn(engine: Arc<TradeEngine>, worker_count: usize, queue_capacity: usize, cancel: CancellationToken) -> (Self, JoinSet<()>) {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let mut tasks = JoinSet::new();

        for worker_id in 0..worker_count.max(1) {
            let engine = engine.clone();
            let rx = rx.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                loop {
                    let next = tokio::select! {
                        _ = cancel.cancelled() => None,
                        msg = async { rx.lock().await.recv().await } => msg,
                    };
                    let Some(trade_id) = next else {
                        return;
                    };
                    match engine.advance(trade_id).await {
                        Ok(trade) => {
                            tracing::debug!(worker_id, trade_id = %trade_id, status = ?trade.status, "advanced trade");
                        }
                        Err(err) => {
                            warn!(worker_id, trade_id = %trade_id, error = %err, "advance failed, trade remains for the next reconciler pass");
                        }
                    }
                }
            });
        }

        (Self { sender: tx }, tasks)
    }

    /// Enqueues `trade_id` for the next free worker, backpressuring the
    /// caller if every worker is busy and the queue is full — a saturated
    /// queue means the system is already at capacity (spec.md §5), and the
    /// reconciler will pick the trade back up on its next sweep regardless.
    pub async fn enqueue(&self, trade_id: Uuid) {
        if self.sender.send(trade_id).await.is_err() {
            error!(trade_id = %trade_id, "scheduler channel closed, dropping advance request");
        }
    }
}
