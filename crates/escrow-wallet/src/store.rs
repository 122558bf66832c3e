use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use escrow_types::{EscrowError, Transaction, TransactionKind, User};
use uuid::Uuid;

/// Storage seam the ledger operates over. `escrow-store` implements this
/// against Postgres with `SELECT ... FOR UPDATE` inside `apply`; tests use
/// [`InMemoryWalletStore`].
#[async_trait]
pub trait WalletStore: std::fmt::Debug + Send + Sync + 'static {
    async fn get_user(&self, steam_id: u64) -> Result<User, EscrowError>;

    /// Locks the user row, runs `mutate` against a clone, persists it, and
    /// appends `txn` to the journal as one unit — the stand-in for "state
    /// transitions and ledger writes are committed atomically" (spec.md
    /// §4.5). `mutate` returning `Err` aborts the whole call; nothing is
    /// persisted.
    async fn apply(
        &self,
        steam_id: u64,
        txn: Transaction,
        mutate: Box<dyn FnOnce(&mut User) -> Result<(), EscrowError> + Send>,
    ) -> Result<User, EscrowError>;

    /// Appends an audit-only entry with no corresponding user-row mutation
    /// (the platform fee leg of a payout).
    async fn append_only(&self, txn: Transaction) -> Result<(), EscrowError>;

    async fn find_posted_transaction(&self, trade_id: Uuid, kind: TransactionKind) -> Result<Option<Transaction>, EscrowError>;

    async fn transactions_for_user(&self, steam_id: u64) -> Result<Vec<Transaction>, EscrowError>;

    /// Updates the user's cached delivery trade url, used by `pay`'s
    /// buyer-leg offer (`Trade` itself carries no such field, so this is
    /// profile state rather than a ledger-affecting mutation).
    async fn set_delivery_trade_url(&self, steam_id: u64, trade_url: String) -> Result<(), EscrowError>;
}

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<u64, User>,
    transactions: Vec<Transaction>,
}

/// In-memory fake, one `Mutex` guarding both maps so `apply` is a genuine
/// critical section (mirrors `escrow-kv::InMemoryKv`).
#[derive(Debug, Default)]
pub struct InMemoryWalletStore {
    inner: Mutex<Inner>,
}

impl InMemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_user(&self, user: User) {
        self.inner.lock().unwrap().users.insert(user.steam_id, user);
    }
}

#[async_trait]
impl WalletStore for InMemoryWalletStore {
    async fn get_user(&self, steam_id: u64) -> Result<User, EscrowError> {
        self.inner
            .lock()
            .unwrap()
            .users
            .get(&steam_id)
            .cloned()
            .ok_or_else(|| EscrowError::NotFound(format!("user {steam_id}")))
    }

    async fn apply(
        &self,
        steam_id: u64,
        txn: Transaction,
        mutate: Box<dyn FnOnce(&mut User) -> Result<(), EscrowError> + Send>,
    ) -> Result<User, EscrowError> {
        let mut inner = self.inner.lock().unwrap();
        let mut user = inner
            .users
            .get(&steam_id)
            .cloned()
            .ok_or_else(|| EscrowError::NotFound(format!("user {steam_id}")))?;

        mutate(&mut user)?;

        if !user.is_invariant_satisfied() {
            return Err(EscrowError::Internal(format!("ledger invariant violated for user {steam_id}")));
        }

        inner.users.insert(steam_id, user.clone());
        inner.transactions.push(txn);
        Ok(user)
    }

    async fn append_only(&self, txn: Transaction) -> Result<(), EscrowError> {
        self.inner.lock().unwrap().transactions.push(txn);
        Ok(())
    }

    async fn find_posted_transaction(&self, trade_id: Uuid, kind: TransactionKind) -> Result<Option<Transaction>, EscrowError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .transactions
            .iter()
            .find(|t| t.trade_id == trade_id && t.kind == kind && t.status == escrow_types::TransactionStatus::Posted)
            .cloned())
    }

    async fn transactions_for_user(&self, steam_id: u64) -> Result<Vec<Transaction>, EscrowError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .transactions
            .iter()
            .filter(|t| t.subject_steam_id == steam_id)
            .cloned()
            .collect())
    }

    async fn set_delivery_trade_url(&self, steam_id: u64, trade_url: String) -> Result<(), EscrowError> {
        let mut inner = self.inner.lock().unwrap();
        let user = inner
            .users
            .get_mut(&steam_id)
            .ok_or_else(|| EscrowError::NotFound(format!("user {steam_id}")))?;
        user.delivery_trade_url = Some(trade_url);
        Ok(())
    }
}
