use dashmap::DashMap;
use escrow_types::Notification;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// In-memory registry of live `/ws` connections, keyed by steam id — the
/// "best-effort" WebSocket push path of spec.md §4.7. A missing entry means
/// the recipient is offline and the message is only persisted.
#[derive(Debug, Default)]
pub struct PushRegistry {
    connections: DashMap<u64, UnboundedSender<Notification>>,
}

impl PushRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a live connection for `steam_id`, returning the receiving
    /// half the caller's WebSocket write loop should drain.
    pub fn register(&self, steam_id: u64) -> UnboundedReceiver<Notification> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(steam_id, tx);
        rx
    }

    pub fn unregister(&self, steam_id: u64) {
        self.connections.remove(&steam_id);
    }

    pub fn is_connected(&self, steam_id: u64) -> bool {
        self.connections.contains_key(&steam_id)
    }

    /// Best-effort push. Returns `true` if a live connection accepted the
    /// message; `false` (including a dead/dropped channel) means the caller
    /// must fall back to the persisted-pending path.
    pub fn push(&self, steam_id: u64, notification: Notification) -> bool {
        match self.connections.get(&steam_id) {
            Some(sender) => sender.send(notification).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use escrow_types::{NotificationKind, NotificationStatus};
    use uuid::Uuid;

    fn sample(recipient: u64) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            recipient_steam_id: recipient,
            kind: NotificationKind::TradeCreated,
            payload: serde_json::json!({}),
            status: NotificationStatus::Pending,
            created_at: Utc::now(),
            delivered_at: None,
            read_at: None,
        }
    }

    #[test]
    fn push_fails_when_not_connected() {
        let registry = PushRegistry::new();
        assert!(!registry.push(1, sample(1)));
    }

    #[test]
    fn push_succeeds_once_registered() {
        let registry = PushRegistry::new();
        let mut rx = registry.register(1);
        assert!(registry.is_connected(1));
        assert!(registry.push(1, sample(1)));
        assert!(rx.try_recv().is_ok());
    }
}
