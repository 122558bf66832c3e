//! C10: the notification fabric.
//!
//! Dual-path delivery — best-effort WebSocket push to a live connection, or
//! durable store-and-forward otherwise — with per-user ordering preserved by
//! monotonic creation timestamps and oldest-first drain on reconnect (spec.md
//! §4.7). Retention: 7 days after creation, swept by a background task.

#![deny(missing_debug_implementations, unsafe_code)]

pub mod notifier;
pub mod registry;
pub mod store;

pub use notifier::{drain_all, Notifier};
pub use registry::PushRegistry;
pub use store::{InMemoryNotificationStore, NotificationStore};
