//! C6: the bot fleet manager.
//!
//! Owns every [`BotWorker`] in the pool: drives the `offline -> initializing
//! -> ready <-> degraded -> banned` state machine (spec.md §4.4), serializes
//! concurrent login attempts per account behind a `DashMap`-keyed mutex (the
//! registry pattern `juliarose-steam-tradeoffer-manager`'s `TradeOfferManager`
//! uses for its polling task, applied here to per-account login locks instead
//! of a single poll handle), and runs the background re-prober that tries to
//! bring `degraded` bots back to `ready` every 60s.

#![deny(missing_debug_implementations, unsafe_code)]

mod worker;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use escrow_kv::KvStore;
use escrow_types::{BotStatus, EscrowError};
use steam_trading::TradeError;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use worker::BotWorker;

/// How often the background prober retries `degraded` bots (spec.md §4.4).
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(60);

fn classify(err: TradeError) -> EscrowError {
    if err.is_retriable() {
        EscrowError::Transient(err.to_string())
    } else {
        EscrowError::Persistent(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub session_ttl: Duration,
    pub probe_interval: Duration,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(6 * 3600),
            probe_interval: DEFAULT_PROBE_INTERVAL,
        }
    }
}

/// Owns the pool of logged-in Steam bots and hands them out to the trade
/// engine. Holds no Postgres/Redis connection of its own beyond the `KvStore`
/// seam used to cache/restore session blobs.
#[derive(Debug)]
pub struct FleetManager {
    bots: HashMap<u64, Arc<BotWorker>>,
    login_locks: DashMap<String, Arc<AsyncMutex<()>>>,
    kv: Arc<dyn KvStore>,
    config: FleetConfig,
}

impl FleetManager {
    pub fn new(bots: Vec<Arc<BotWorker>>, kv: Arc<dyn KvStore>, config: FleetConfig) -> Self {
        Self {
            bots: bots.into_iter().map(|b| (b.steam_id(), b)).collect(),
            login_locks: DashMap::new(),
            kv,
            config,
        }
    }

    pub fn bot(&self, steam_id: u64) -> Option<Arc<BotWorker>> {
        self.bots.get(&steam_id).cloned()
    }

    pub fn all_bots(&self) -> Vec<Arc<BotWorker>> {
        self.bots.values().cloned().collect()
    }

    /// Brings every bot from `offline` to `ready`, restoring a cached session
    /// before falling back to a fresh login. Call once at startup.
    pub async fn initialize_all(&self) -> Vec<(u64, Result<(), EscrowError>)> {
        let mut results = Vec::with_capacity(self.bots.len());
        for bot in self.bots.values() {
            results.push((bot.steam_id(), self.ensure_ready(bot).await));
        }
        results
    }

    /// Login flow from spec.md §4.4: "Session restore is attempted before
    /// login... a queue (per-account) serializes concurrent login attempts."
    ///
    /// Drives the state machine to `ready` from either `offline` (via
    /// `initializing`) or `degraded` (directly, per the `degraded -> ready`
    /// edge) — the two states a bot is recovered from.
    async fn ensure_ready(&self, bot: &Arc<BotWorker>) -> Result<(), EscrowError> {
        if bot.status().await == BotStatus::Ready {
            return Ok(());
        }

        let lock = self
            .login_locks
            .entry(bot.account_name().to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another task may have already brought the bot ready while we
        // waited for the lock.
        if bot.status().await == BotStatus::Ready {
            return Ok(());
        }

        if bot.status().await == BotStatus::Offline {
            bot.transition(BotStatus::Initializing).await;
        }

        if let Ok(Some(session)) = self.kv.get_session(bot.steam_id()).await {
            if !session.is_stale(chrono::Utc::now(), chrono::Duration::from_std(self.config.session_ttl).unwrap_or_default())
                && bot.client.restore(&session).await.is_ok()
            {
                bot.transition(BotStatus::Ready).await;
                info!(steam_id = bot.steam_id(), "bot session restored from cache");
                return Ok(());
            }
        }

        match bot.client.login().await {
            Ok(session) => {
                if let Err(err) = self.kv.set_session(&session, self.config.session_ttl).await {
                    warn!(steam_id = bot.steam_id(), error = %err, "failed to cache bot session after login");
                }
                bot.transition(BotStatus::Ready).await;
                info!(steam_id = bot.steam_id(), "bot logged in fresh");
                Ok(())
            }
            Err(err) => {
                bot.set_last_error(err.to_string()).await;
                if bot.status().await != BotStatus::Degraded {
                    bot.transition(BotStatus::Offline).await;
                }
                Err(classify(err))
            }
        }
    }

    /// Returns the least-loaded `ready` bot not in `excluding`, incrementing
    /// its active-trade count. `None` if no bot is currently assignable.
    pub async fn acquire(&self, excluding: &[u64]) -> Option<Arc<BotWorker>> {
        let mut candidates = Vec::new();
        for bot in self.bots.values() {
            if excluding.contains(&bot.steam_id()) {
                continue;
            }
            if bot.status().await == BotStatus::Ready {
                candidates.push((bot.load().await, bot.clone()));
            }
        }
        candidates.sort_by_key(|(load, _)| *load);
        let (_, chosen) = candidates.into_iter().next()?;
        chosen.incr_load().await;
        Some(chosen)
    }

    pub async fn release(&self, bot: &Arc<BotWorker>) {
        bot.decr_load().await;
    }

    /// Marks a bot `degraded` after a failed Steam call, so `acquire` stops
    /// handing it out until the prober restores it.
    pub async fn mark_degraded(&self, bot: &Arc<BotWorker>, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(steam_id = bot.steam_id(), reason, "marking bot degraded");
        bot.set_last_error(reason).await;
        bot.transition(BotStatus::Degraded).await;
    }

    /// Spawns the background task that retries `degraded` bots every
    /// `probe_interval`, restoring them to `ready` on success.
    pub fn spawn_prober(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.probe_interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("bot prober shutting down");
                        return;
                    }
                    _ = ticker.tick() => {
                        for bot in self.bots.values() {
                            if bot.status().await != BotStatus::Degraded {
                                continue;
                            }
                            if let Err(err) = self.ensure_ready(bot).await {
                                warn!(steam_id = bot.steam_id(), error = %err, "degraded bot probe failed, remains degraded");
                            } else {
                                info!(steam_id = bot.steam_id(), "degraded bot recovered to ready");
                            }
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrow_kv::InMemoryKv;
    use escrow_types::{Bot, BotSecrets, BotStatus};
    use steam_trading::MockSteamClient;

    fn sample_bot(steam_id: u64) -> Bot {
        Bot {
            steam_id,
            account_name: format!("bot{steam_id}"),
            status: BotStatus::Offline,
            inventory_size: 0,
            active_trade_count: 0,
            last_error: None,
            last_online_at: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn sample_secrets(steam_id: u64) -> BotSecrets {
        BotSecrets {
            account_name: format!("bot{steam_id}"),
            password: "x".into(),
            totp_shared_secret: "AAAAAAAAAAAAAAAA".into(),
            identity_secret: "AAAAAAAAAAAAAAAA".into(),
        }
    }

    fn worker(steam_id: u64) -> Arc<BotWorker> {
        BotWorker::new(sample_bot(steam_id), sample_secrets(steam_id), Arc::new(MockSteamClient::new(steam_id)))
    }

    #[tokio::test]
    async fn initialize_brings_all_bots_ready() {
        let fleet = FleetManager::new(vec![worker(1), worker(2)], Arc::new(InMemoryKv::new()), FleetConfig::default());
        let results = fleet.initialize_all().await;
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(fleet.bot(1).unwrap().status().await, BotStatus::Ready);
    }

    #[tokio::test]
    async fn acquire_picks_least_loaded_and_excludes() {
        let fleet = FleetManager::new(vec![worker(1), worker(2)], Arc::new(InMemoryKv::new()), FleetConfig::default());
        fleet.initialize_all().await;

        let first = fleet.acquire(&[]).await.unwrap();
        // Bot 1 now has load 1; bot 2 has load 0, so the next acquire (not
        // excluding anyone) should pick bot 2 as the least-loaded.
        let second = fleet.acquire(&[]).await.unwrap();
        assert_ne!(first.steam_id(), second.steam_id());

        assert!(fleet.acquire(&[first.steam_id(), second.steam_id()]).await.is_none());
    }

    #[tokio::test]
    async fn degraded_bot_is_excluded_from_acquire() {
        let fleet = FleetManager::new(vec![worker(1)], Arc::new(InMemoryKv::new()), FleetConfig::default());
        fleet.initialize_all().await;
        let bot = fleet.bot(1).unwrap();
        fleet.mark_degraded(&bot, "inventory fetch failed").await;

        assert!(fleet.acquire(&[]).await.is_none());
    }
}
