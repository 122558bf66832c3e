//! C3: the ephemeral KV store.
//!
//! Holds only what spec.md §5 allows it to hold — bot sessions, idempotency
//! keys, rate-limit counters, and notification delivery queues — everything
//! else lives in `escrow-store`. Nothing here is the system of record; a
//! flushed Redis is a recoverable event, never a data-loss one.

#![deny(missing_debug_implementations, unsafe_code)]

pub mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use escrow_types::BotSession;
use thiserror::Error;
use uuid::Uuid;

pub use redis_store::RedisKv;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv backend error: {0}")]
    Backend(String),
    #[error("kv store unavailable")]
    Unavailable,
}

/// Narrow interface the rest of the workspace depends on, so tests can swap
/// in `InMemoryKv` instead of standing up a real Redis.
#[async_trait]
pub trait KvStore: std::fmt::Debug + Send + Sync + 'static {
    async fn get_session(&self, bot_steam_id: u64) -> Result<Option<BotSession>, KvError>;
    async fn set_session(&self, session: &BotSession, ttl: Duration) -> Result<(), KvError>;
    async fn invalidate_session(&self, bot_steam_id: u64) -> Result<(), KvError>;

    /// Atomically increments the counter at `key`, setting a TTL only the
    /// first time it is created in the current window (spec.md §4.1: "the
    /// first increment sets a 2×window TTL"). Returns the post-increment
    /// count.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, KvError>;

    /// Sets `key -> value` only if absent, with `ttl`. Returns `true` if this
    /// call created the key (i.e. this caller won the idempotency race).
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError>;
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    async fn push_notification_queue(&self, recipient_steam_id: u64, notification_id: Uuid) -> Result<(), KvError>;
    async fn drain_notification_queue(&self, recipient_steam_id: u64) -> Result<Vec<Uuid>, KvError>;
}

/// In-memory fake used by unit/integration tests across the workspace.
#[derive(Debug, Default)]
pub struct InMemoryKv {
    sessions: std::sync::Mutex<std::collections::HashMap<u64, BotSession>>,
    counters: std::sync::Mutex<std::collections::HashMap<String, u64>>,
    strings: std::sync::Mutex<std::collections::HashMap<String, String>>,
    queues: std::sync::Mutex<std::collections::HashMap<u64, Vec<Uuid>>>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKv {
    async fn get_session(&self, bot_steam_id: u64) -> Result<Option<BotSession>, KvError> {
        Ok(self.sessions.lock().unwrap().get(&bot_steam_id).cloned())
    }

    async fn set_session(&self, session: &BotSession, _ttl: Duration) -> Result<(), KvError> {
        self.sessions.lock().unwrap().insert(session.steam_id, session.clone());
        Ok(())
    }

    async fn invalidate_session(&self, bot_steam_id: u64) -> Result<(), KvError> {
        self.sessions.lock().unwrap().remove(&bot_steam_id);
        Ok(())
    }

    async fn incr_with_ttl(&self, key: &str, _ttl: Duration) -> Result<u64, KvError> {
        let mut counters = self.counters.lock().unwrap();
        let entry = counters.entry(key.to_string()).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    async fn set_if_absent(&self, key: &str, value: &str, _ttl: Duration) -> Result<bool, KvError> {
        let mut strings = self.strings.lock().unwrap();
        if strings.contains_key(key) {
            Ok(false)
        } else {
            strings.insert(key.to_string(), value.to_string());
            Ok(true)
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        Ok(self.strings.lock().unwrap().get(key).cloned())
    }

    async fn push_notification_queue(&self, recipient_steam_id: u64, notification_id: Uuid) -> Result<(), KvError> {
        self.queues
            .lock()
            .unwrap()
            .entry(recipient_steam_id)
            .or_default()
            .push(notification_id);
        Ok(())
    }

    async fn drain_notification_queue(&self, recipient_steam_id: u64) -> Result<Vec<Uuid>, KvError> {
        Ok(self.queues.lock().unwrap().remove(&recipient_steam_id).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn idempotency_key_wins_exactly_once() {
        let kv = InMemoryKv::new();
        let first = kv.set_if_absent("trade:1:awaiting_buyer", "offer-1", Duration::from_secs(60)).await.unwrap();
        let second = kv.set_if_absent("trade:1:awaiting_buyer", "offer-2", Duration::from_secs(60)).await.unwrap();
        assert!(first);
        assert!(!second);
        assert_eq!(kv.get("trade:1:awaiting_buyer").await.unwrap().unwrap(), "offer-1");
    }

    #[tokio::test]
    async fn rate_counter_increments_monotonically() {
        let kv = InMemoryKv::new();
        for expected in 1..=5u64 {
            let count = kv.incr_with_ttl("steam:ratelimit:1000", Duration::from_secs(60)).await.unwrap();
            assert_eq!(count, expected);
        }
    }

    #[tokio::test]
    async fn notification_queue_drains_once() {
        let kv = InMemoryKv::new();
        let id = Uuid::new_v4();
        kv.push_notification_queue(42, id).await.unwrap();
        let drained = kv.drain_notification_queue(42).await.unwrap();
        assert_eq!(drained, vec![id]);
        assert!(kv.drain_notification_queue(42).await.unwrap().is_empty());
    }
}
