use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use escrow_types::{EscrowError, Notification, NotificationStatus};
use uuid::Uuid;

/// Storage seam for notifications (spec.md §3 "Notification", §4.7). The
/// orchestrator wires [`crate::store::NotificationStore`] to Postgres;
/// tests use [`InMemoryNotificationStore`] — the same
/// trait-plus-in-memory-fake shape as `escrow_kv::KvStore` and
/// `escrow_wallet::WalletStore`.
#[async_trait]
pub trait NotificationStore: std::fmt::Debug + Send + Sync + 'static {
    async fn insert(&self, notification: Notification) -> Result<(), EscrowError>;
    async fn mark_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), EscrowError>;
    async fn mark_read(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), EscrowError>;

    /// Oldest-first pending notifications for `recipient_steam_id` — "per-user
    /// order is preserved... delivering oldest-first on reconnect" (§4.7).
    async fn pending_for_user(&self, recipient_steam_id: u64) -> Result<Vec<Notification>, EscrowError>;

    /// Deletes notifications older than the 7-day retention window (§3).
    /// Returns the number deleted.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, EscrowError>;
}

#[derive(Debug, Default)]
pub struct InMemoryNotificationStore {
    inner: Mutex<HashMap<Uuid, Notification>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Uuid) -> Option<Notification> {
        self.inner.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn insert(&self, notification: Notification) -> Result<(), EscrowError> {
        self.inner.lock().unwrap().insert(notification.id, notification);
        Ok(())
    }

    async fn mark_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), EscrowError> {
        let mut inner = self.inner.lock().unwrap();
        let notification = inner.get_mut(&id).ok_or_else(|| EscrowError::NotFound(format!("notification {id}")))?;
        if notification.status == NotificationStatus::Pending {
            notification.status = NotificationStatus::Delivered;
            notification.delivered_at = Some(at);
        }
        Ok(())
    }

    async fn mark_read(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), EscrowError> {
        let mut inner = self.inner.lock().unwrap();
        let notification = inner.get_mut(&id).ok_or_else(|| EscrowError::NotFound(format!("notification {id}")))?;
        notification.status = NotificationStatus::Read;
        notification.read_at = Some(at);
        Ok(())
    }

    async fn pending_for_user(&self, recipient_steam_id: u64) -> Result<Vec<Notification>, EscrowError> {
        let mut pending: Vec<Notification> = self
            .inner
            .lock()
            .unwrap()
            .values()
            .filter(|n| n.recipient_steam_id == recipient_steam_id && n.status == NotificationStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|n| n.created_at);
        Ok(pending)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, EscrowError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.len();
        inner.retain(|_, n| !n.is_expired(now));
        Ok((before - inner.len()) as u64)
    }
}
