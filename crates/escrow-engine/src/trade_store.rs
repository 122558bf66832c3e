use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use escrow_types::{Actor, EscrowError, HistoryRow, Trade, TradeStatus};
use uuid::Uuid;

/// Storage seam for trades (C8's aggregate). `escrow-store` implements this
/// against Postgres with `SELECT ... FOR UPDATE` inside `transition` (spec.md
/// §4.3's row lock); [`InMemoryTradeStore`] backs the engine's own tests.
///
/// Mirrors the shape of `escrow_wallet::WalletStore::apply`: the caller
/// performs any external (Steam) effect *before* calling `transition`, so the
/// closure passed here is pure state computation, never I/O — matching §5's
/// "external effects occur before the locking transaction".
#[async_trait]
pub trait TradeStore: std::fmt::Debug + Send + Sync + 'static {
    async fn insert(&self, trade: Trade) -> Result<(), EscrowError>;
    async fn get(&self, id: Uuid) -> Result<Trade, EscrowError>;

    /// Trades whose `expires_at` has passed, or whose status is non-terminal
    /// and hasn't been touched in a while — the reconciler's scan query
    /// (spec.md §4.6).
    async fn due_for_reconciliation(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Trade>, EscrowError>;

    /// Locks the trade row, calls `mutate` with the current state, and
    /// persists the returned `(Trade, HistoryRow)` atomically. `mutate`
    /// returning `Err` aborts the whole call, leaving the trade untouched.
    /// Rejects (`PreconditionFailed`) if `mutate`'s new status is not a legal
    /// edge from the locked current status — defense-in-depth for testable
    /// property 5 ("legal transitions only") even if a caller's own check
    /// has a bug.
    async fn transition(
        &self,
        id: Uuid,
        mutate: Box<dyn FnOnce(&Trade) -> Result<Trade, EscrowError> + Send>,
    ) -> Result<Trade, EscrowError>;
}

struct Inner {
    trades: HashMap<Uuid, Trade>,
    history: Vec<HistoryRow>,
    next_history_id: i64,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner").field("trades", &self.trades.len()).field("history", &self.history.len()).finish()
    }
}

/// In-memory fake, a single `Mutex` making `transition` a genuine critical
/// section per trade (and across trades, which is stricter than Postgres's
/// per-row lock but harmless for tests).
#[derive(Debug, Default)]
pub struct InMemoryTradeStore {
    inner: Mutex<Option<Inner>>,
}

impl InMemoryTradeStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Some(Inner { trades: HashMap::new(), history: Vec::new(), next_history_id: 1 })) }
    }

    pub fn history_for(&self, trade_id: Uuid) -> Vec<HistoryRow> {
        let guard = self.inner.lock().unwrap();
        guard.as_ref().unwrap().history.iter().filter(|h| h.trade_id == trade_id).cloned().collect()
    }
}

#[async_trait]
impl TradeStore for InMemoryTradeStore {
    async fn insert(&self, trade: Trade) -> Result<(), EscrowError> {
        let mut guard = self.inner.lock().unwrap();
        let inner = guard.as_mut().unwrap();
        inner.next_history_id += 1;
        inner.history.push(HistoryRow {
            id: inner.next_history_id,
            trade_id: trade.id,
            previous_status: None,
            new_status: trade.status,
            actor: Actor::System,
            notes: Some("trade created".into()),
            created_at: trade.created_at,
        });
        inner.trades.insert(trade.id, trade);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Trade, EscrowError> {
        self.inner
            .lock()
            .unwrap()
            .as_ref()
            .unwrap()
            .trades
            .get(&id)
            .cloned()
            .ok_or_else(|| EscrowError::NotFound(format!("trade {id}")))
    }

    async fn due_for_reconciliation(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Trade>, EscrowError> {
        let guard = self.inner.lock().unwrap();
        let mut due: Vec<Trade> = guard
            .as_ref()
            .unwrap()
            .trades
            .values()
            .filter(|t| !t.status.is_terminal() && (t.expires_at <= now || t.cancel_requested || matches!(t.status, TradeStatus::AwaitingSeller | TradeStatus::AwaitingBuyer | TradeStatus::ErrorSending | TradeStatus::ErrorForwarding | TradeStatus::PaymentReceived)))
            .cloned()
            .collect();
        due.sort_by_key(|t| t.updated_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn transition(
        &self,
        id: Uuid,
        mutate: Box<dyn FnOnce(&Trade) -> Result<Trade, EscrowError> + Send>,
    ) -> Result<Trade, EscrowError> {
        let mut guard = self.inner.lock().unwrap();
        let inner = guard.as_mut().unwrap();
        let current = inner.trades.get(&id).cloned().ok_or_else(|| EscrowError::NotFound(format!("trade {id}")))?;

        let next = mutate(&current)?;

        if next.status != current.status && !current.status.can_transition_to(next.status) {
            return Err(EscrowError::PreconditionFailed);
        }

        inner.next_history_id += 1;
        inner.history.push(HistoryRow {
            id: inner.next_history_id,
            trade_id: id,
            previous_status: Some(current.status),
            new_status: next.status,
            actor: Actor::System,
            notes: next.notes.clone(),
            created_at: next.updated_at,
        });
        inner.trades.insert(id, next.clone());
        Ok(next)
    }
}
