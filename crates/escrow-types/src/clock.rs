//! C1: monotonic time and id generation.
//!
//! Every other component asks for time and ids through this module instead of
//! calling `chrono::Utc::now()`/`Uuid::new_v4()` directly, so that tests can
//! swap in a deterministic `Clock` impl (see `escrow-engine`'s scenario tests).

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Source of wall-clock time, abstracted so the trade engine's deadline math
/// is testable without sleeping.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Generates a new random UUID for a new aggregate (trade, transaction, ...).
pub fn new_id() -> Uuid {
    Uuid::new_v4()
}

/// Generates a random, URL-safe token (trade links, idempotency salts).
pub fn new_token(len: usize) -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClock(DateTime<Utc>);
    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[test]
    fn fixed_clock_is_stable() {
        let t = Utc::now();
        let clock = FixedClock(t);
        assert_eq!(clock.now(), t);
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn token_has_requested_length() {
        assert_eq!(new_token(24).len(), 24);
    }
}
