//! Redis-backed implementation of [`crate::KvStore`].

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{redis::AsyncCommands, Config, Pool, Runtime};
use escrow_types::BotSession;
use redis::Script;
use tracing::{error, warn};
use uuid::Uuid;

use crate::{KvError, KvStore};

/// Atomically increments a counter and sets a TTL only on the increment
/// that created the key — matching spec.md §4.1's "the first increment sets
/// a 2×window TTL" requirement exactly, which a non-atomic
/// `GET`-then-`SET`/`EXPIRE` pair cannot guarantee under concurrent workers.
const INCR_WITH_TTL_SCRIPT: &str = r#"
local current = redis.call('INCR', KEYS[1])
if tonumber(current) == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return current
"#;

#[derive(Debug)]
pub struct RedisKv {
    pool: Pool,
}

impl RedisKv {
    pub fn connect(redis_url: &str) -> Result<Self, KvError> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| KvError::Backend(e.to_string()))?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, KvError> {
        self.pool.get().await.map_err(|e| {
            warn!(error = %e, "redis pool exhausted or unreachable");
            KvError::Unavailable
        })
    }

    fn session_key(bot_steam_id: u64) -> String {
        format!("escrow:session:{bot_steam_id}")
    }

    fn queue_key(recipient_steam_id: u64) -> String {
        format!("escrow:notifyqueue:{recipient_steam_id}")
    }
}

#[async_trait]
impl KvStore for RedisKv {
    async fn get_session(&self, bot_steam_id: u64) -> Result<Option<BotSession>, KvError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn
            .get(Self::session_key(bot_steam_id))
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;
        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| KvError::Backend(e.to_string())),
            None => Ok(None),
        }
    }

    async fn set_session(&self, session: &BotSession, ttl: Duration) -> Result<(), KvError> {
        let mut conn = self.conn().await?;
        let json = serde_json::to_string(session).map_err(|e| KvError::Backend(e.to_string()))?;
        conn.set_ex::<_, _, ()>(Self::session_key(session.steam_id), json, ttl.as_secs())
            .await
            .map_err(|e| KvError::Backend(e.to_string()))
    }

    async fn invalidate_session(&self, bot_steam_id: u64) -> Result<(), KvError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(Self::session_key(bot_steam_id))
            .await
            .map_err(|e| KvError::Backend(e.to_string()))
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, KvError> {
        let mut conn = self.conn().await?;
        Script::new(INCR_WITH_TTL_SCRIPT)
            .key(key)
            .arg(ttl.as_secs())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                error!(error = %e, "rate limit script failed");
                KvError::Backend(e.to_string())
            })
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut conn = self.conn().await?;
        let opts = redis::SetOptions::default()
            .conditional_set(redis::ExistenceCheck::NX)
            .with_expiration(redis::SetExpiry::EX(ttl.as_secs() as usize));
        let result: Option<String> = redis::Cmd::set_options(key, value, opts)
            .query_async(&mut conn)
            .await
            .map_err(|e| KvError::Backend(e.to_string()))?;
        Ok(result.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn().await?;
        conn.get(key).await.map_err(|e| KvError::Backend(e.to_string()))
    }

    async fn push_notification_queue(&self, recipient_steam_id: u64, notification_id: Uuid) -> Result<(), KvError> {
        let mut conn = self.conn().await?;
        conn.rpush::<_, _, ()>(Self::queue_key(recipient_steam_id), notification_id.to_string())
            .await
            .map_err(|e| KvError::Backend(e.to_string()))
    }

    async fn drain_notification_queue(&self, recipient_steam_id: u64) -> Result<Vec<Uuid>, KvError> {
        let mut conn = self.conn().await?;
        let key = Self::queue_key(recipient_steam_id);
        let raw: Vec<String> = conn.lrange(&key, 0, -1).await.map_err(|e| KvError::Backend(e.to_string()))?;
        conn.del::<_, ()>(&key).await.map_err(|e| KvError::Backend(e.to_string()))?;
        Ok(raw.into_iter().filter_map(|s| Uuid::parse_str(&s).ok()).collect())
    }
}
