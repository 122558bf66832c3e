use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::scheduler::Scheduler;
use crate::trade_store::TradeStore;

/// C9: the poll/reconciler loop from spec.md §4.6. Periodically scans for
/// trades that need a nudge — an expired deadline, a pending cancellation,
/// or an in-flight leg that hasn't been polled in a while — and feeds them
/// back into the state machine via the [`Scheduler`], the same path a fresh
/// `pay()` call uses. The reconciler never mutates a trade directly; it is
/// just another caller of `TradeEngine::advance`.
#[derive(Debug, Clone)]
pub struct Reconciler {
    trades: Arc<dyn TradeStore>,
    scheduler: Scheduler,
    batch_size: i64,
}

impl Reconciler {
    pub fn new(trades: Arc<dyn TradeStore>, scheduler: Scheduler, batch_size: i64) -> Self {
        Self { trades, scheduler, batch_size }
    }

    async fn sweep(&self) {
        match self.trades.due_for_reconciliation(Utc::now(), self.batch_size).await {
            Ok(due) => {
                if !due.is_empty() {
                    info!(count = due.len(), "reconciler sweep found due trades");
                }
                for trade in due {
                    self.scheduler.enqueue(trade.id).await;
                }
            }
            Err(err) => warn!(error = %err, "reconciler sweep query failed"),
        }
    }

    pub fn spawn(self, interval: Duration, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("reconciler shutting down");
                        return;
                    }
                    _ = ticker.tick() => self.sweep().await,
                }
            }
        })
    }
}
