use std::sync::Arc;

use chrono::Utc;
use escrow_types::{EscrowError, Notification, NotificationKind};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::registry::PushRegistry;
use crate::store::NotificationStore;

/// C10's public surface: dual-path delivery (WebSocket push when the
/// recipient is online, persisted `pending` otherwise), drain-on-reconnect,
/// ack, and the 7-day retention sweep (spec.md §4.7).
#[derive(Debug, Clone)]
pub struct Notifier {
    store: Arc<dyn NotificationStore>,
    registry: Arc<PushRegistry>,
}

impl Notifier {
    pub fn new(store: Arc<dyn NotificationStore>, registry: Arc<PushRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn registry(&self) -> Arc<PushRegistry> {
        self.registry.clone()
    }

    /// Creates and attempts to deliver one notification. Always persists
    /// first so drain-on-reconnect never loses a message sent while the push
    /// race is still in flight.
    pub async fn notify(&self, recipient_steam_id: u64, kind: NotificationKind, payload: serde_json::Value) -> Result<Uuid, EscrowError> {
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient_steam_id,
            kind,
            payload,
            status: escrow_types::NotificationStatus::Pending,
            created_at: Utc::now(),
            delivered_at: None,
            read_at: None,
        };
        let id = notification.id;
        self.store.insert(notification.clone()).await?;

        if self.registry.push(recipient_steam_id, notification) {
            self.store.mark_delivered(id, Utc::now()).await?;
        }
        Ok(id)
    }

    /// Drains pending notifications oldest-first into the just-registered
    /// connection (spec.md §4.7: "On next login the client drains pending
    /// items"). Called right after [`PushRegistry::register`].
    pub async fn drain_on_reconnect(&self, steam_id: u64) -> Result<usize, EscrowError> {
        let pending = self.store.pending_for_user(steam_id).await?;
        let mut delivered = 0;
        for notification in pending {
            let id = notification.id;
            if self.registry.push(steam_id, notification) {
                self.store.mark_delivered(id, Utc::now()).await?;
                delivered += 1;
            } else {
                // Connection dropped mid-drain; remaining items stay pending
                // for the next reconnect.
                break;
            }
        }
        Ok(delivered)
    }

    /// Client-originated ack, per the `{ack, notification_id}` WebSocket
    /// contract (spec.md §6).
    pub async fn ack(&self, notification_id: Uuid) -> Result<(), EscrowError> {
        self.store.mark_read(notification_id, Utc::now()).await
    }

    /// Spawns the 7-day retention sweep as a background task, cancellable via
    /// `cancel`.
    pub fn spawn_sweeper(self: Arc<Self>, interval: std::time::Duration, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("notification sweeper shutting down");
                        return;
                    }
                    _ = ticker.tick() => {
                        match self.store.sweep_expired(Utc::now()).await {
                            Ok(count) if count > 0 => info!(count, "swept expired notifications"),
                            Ok(_) => {}
                            Err(err) => warn!(error = %err, "notification sweep failed"),
                        }
                    }
                }
            }
        })
    }
}

/// Drains an `UnboundedReceiver` registered via [`PushRegistry::register`]
/// into a `Vec` without blocking — used by tests to assert delivery order.
pub async fn drain_all(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryNotificationStore;

    fn notifier() -> (Notifier, Arc<PushRegistry>) {
        let registry = Arc::new(PushRegistry::new());
        let notifier = Notifier::new(Arc::new(InMemoryNotificationStore::new()), registry.clone());
        (notifier, registry)
    }

    #[tokio::test]
    async fn offline_recipient_notification_stays_pending_then_drains() {
        let (notifier, registry) = notifier();
        notifier.notify(42, NotificationKind::TradeCreated, serde_json::json!({"a": 1})).await.unwrap();
        notifier.notify(42, NotificationKind::PaymentReceived, serde_json::json!({"a": 2})).await.unwrap();

        let mut rx = registry.register(42);
        let delivered = notifier.drain_on_reconnect(42).await.unwrap();
        assert_eq!(delivered, 2);

        let messages = drain_all(&mut rx).await;
        assert_eq!(messages.len(), 2);
        // Oldest-first.
        assert_eq!(messages[0].kind, NotificationKind::TradeCreated);
        assert_eq!(messages[1].kind, NotificationKind::PaymentReceived);
    }

    #[tokio::test]
    async fn online_recipient_gets_immediate_delivery() {
        let (notifier, registry) = notifier();
        let mut rx = registry.register(7);
        notifier.notify(7, NotificationKind::TradeCompleted, serde_json::json!({})).await.unwrap();

        assert!(rx.try_recv().is_ok());
        // Nothing left pending for a later reconnect.
        assert_eq!(notifier.drain_on_reconnect(7).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ack_marks_read() {
        let (notifier, _registry) = notifier();
        let id = notifier.notify(1, NotificationKind::TradeCreated, serde_json::json!({})).await.unwrap();
        notifier.ack(id).await.unwrap();
    }
}
