use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotStatus {
    Offline,
    Initializing,
    Ready,
    Degraded,
    Banned,
}

impl BotStatus {
    /// Bot fleet manager state machine edges (spec.md §4.4):
    /// `offline -> initializing -> ready <-> degraded -> banned`.
    pub fn can_transition_to(self, target: BotStatus) -> bool {
        use BotStatus::*;
        matches!(
            (self, target),
            (Offline, Initializing)
                | (Initializing, Ready)
                | (Initializing, Offline)
                | (Ready, Degraded)
                | (Degraded, Ready)
                | (Ready, Offline)
                | (Degraded, Offline)
                | (Offline, Banned)
                | (Ready, Banned)
                | (Degraded, Banned)
                | (Initializing, Banned)
        )
    }
}

/// Secrets needed to authenticate a bot account. Held decrypted only in the
/// memory of the bot worker that owns it (spec.md §5 "Shared-resource
/// policy").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSecrets {
    pub account_name: String,
    pub password: String,
    pub totp_shared_secret: String,
    pub identity_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub steam_id: u64,
    pub account_name: String,
    pub status: BotStatus,
    pub inventory_size: i64,
    pub active_trade_count: i32,
    pub last_error: Option<String>,
    pub last_online_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bot {
    pub fn is_assignable(&self) -> bool {
        self.status == BotStatus::Ready
    }
}

/// Cacheable session blob (spec.md §3 "Bot session"). Non-authoritative: a
/// missing or stale session triggers a re-login through the 2FA path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSession {
    pub steam_id: u64,
    pub cookies: Vec<String>,
    pub session_id: String,
    pub saved_at: DateTime<Utc>,
}

impl BotSession {
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.saved_at > ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bot_state_machine_rejects_ready_to_initializing() {
        assert!(!BotStatus::Ready.can_transition_to(BotStatus::Initializing));
        assert!(BotStatus::Ready.can_transition_to(BotStatus::Degraded));
        assert!(BotStatus::Degraded.can_transition_to(BotStatus::Ready));
    }

    #[test]
    fn session_staleness() {
        let session = BotSession {
            steam_id: 1,
            cookies: vec![],
            session_id: "abc".into(),
            saved_at: Utc::now() - chrono::Duration::hours(5),
        };
        assert!(session.is_stale(Utc::now(), chrono::Duration::hours(4)));
        assert!(!session.is_stale(Utc::now(), chrono::Duration::hours(6)));
    }
}
