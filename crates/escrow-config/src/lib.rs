//! Typed configuration for the escrow orchestrator.
//!
//! Layering follows the `config` crate's usual convention (seen across the
//! pack's service manifests): compiled-in defaults, then an optional
//! `config/<profile>.toml` file, then environment variables prefixed
//! `ESCROW_`, environment taking precedence. Secrets (§6 "Environment-
//! provided secrets") are read separately via `dotenvy` + raw env lookups,
//! never logged.

#![deny(missing_debug_implementations, unsafe_code)]

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("missing required secret: {0}")]
    MissingSecret(&'static str),
}

/// Recognized options from spec.md §6 "Configuration".
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub platform_fee_percent: Decimal,
    pub trade_timeout_seconds: u64,
    pub await_leg_timeout_seconds: u64,
    pub steam_rate_limit_per_minute: u32,
    pub bot_pool_size: u32,
    pub maintenance_mode: bool,
    pub min_listing_price: Decimal,
    pub max_listing_price: Decimal,

    // Ambient additions (SPEC_FULL.md §4/§5), not in the original table but
    // required to run a concrete deployment of the components it describes.
    pub worker_pool_size: u32,
    pub reconciler_interval_seconds: u64,
    pub notification_sweep_interval_seconds: u64,
    pub max_retries: u32,
    pub bot_session_ttl_hours: i64,
    pub bot_probe_interval_seconds: u64,
    pub idempotency_key_ttl_hours: i64,
    pub audit_retention_days: Option<u32>,
    pub risk_review_threshold: i32,
    pub http_bind_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            platform_fee_percent: Decimal::new(50, 1), // 5.0
            trade_timeout_seconds: 86_400,
            await_leg_timeout_seconds: 1_800,
            steam_rate_limit_per_minute: 20,
            bot_pool_size: 4,
            maintenance_mode: false,
            min_listing_price: Decimal::new(10, 2),      // 0.10
            max_listing_price: Decimal::new(10_000_00, 2), // 10000.00
            worker_pool_size: 8,
            reconciler_interval_seconds: 10,
            notification_sweep_interval_seconds: 3_600,
            max_retries: 5,
            bot_session_ttl_hours: 6,
            bot_probe_interval_seconds: 60,
            idempotency_key_ttl_hours: 24,
            audit_retention_days: None,
            risk_review_threshold: 50,
            http_bind_addr: "0.0.0.0:8080".into(),
        }
    }
}

impl Settings {
    pub fn await_leg_timeout(&self) -> Duration {
        Duration::from_secs(self.await_leg_timeout_seconds)
    }

    pub fn trade_timeout(&self) -> Duration {
        Duration::from_secs(self.trade_timeout_seconds)
    }

    /// Loads configuration from defaults, an optional config file, and
    /// `ESCROW_`-prefixed environment variables, in that precedence order.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let defaults = Settings::default();
        let builder = config::Config::builder()
            .set_default("platform_fee_percent", defaults.platform_fee_percent.to_string())?
            .set_default("trade_timeout_seconds", defaults.trade_timeout_seconds)?
            .set_default("await_leg_timeout_seconds", defaults.await_leg_timeout_seconds)?
            .set_default("steam_rate_limit_per_minute", defaults.steam_rate_limit_per_minute)?
            .set_default("bot_pool_size", defaults.bot_pool_size)?
            .set_default("maintenance_mode", defaults.maintenance_mode)?
            .set_default("min_listing_price", defaults.min_listing_price.to_string())?
            .set_default("max_listing_price", defaults.max_listing_price.to_string())?
            .set_default("worker_pool_size", defaults.worker_pool_size)?
            .set_default("reconciler_interval_seconds", defaults.reconciler_interval_seconds)?
            .set_default(
                "notification_sweep_interval_seconds",
                defaults.notification_sweep_interval_seconds,
            )?
            .set_default("max_retries", defaults.max_retries)?
            .set_default("bot_session_ttl_hours", defaults.bot_session_ttl_hours)?
            .set_default("bot_probe_interval_seconds", defaults.bot_probe_interval_seconds)?
            .set_default("idempotency_key_ttl_hours", defaults.idempotency_key_ttl_hours)?
            .set_default("risk_review_threshold", defaults.risk_review_threshold)?
            .set_default("http_bind_addr", defaults.http_bind_addr.clone())?
            .add_source(config::File::with_name("config/settings").required(false))
            .add_source(config::Environment::with_prefix("ESCROW").separator("__"));

        builder.build()?.try_deserialize().map_err(ConfigError::from)
    }
}

/// Secrets from spec.md §6, read directly from the environment rather than
/// from a config file (so they never land on disk next to non-secret
/// settings).
#[derive(Debug, Clone)]
pub struct Secrets {
    pub database_url: String,
    pub redis_url: String,
    pub session_signing_key: String,
    pub notification_push_key: String,
    pub steam_web_api_key: String,
    /// 32-byte AES-256-GCM key, hex-encoded, used by `escrow-store` to seal
    /// bot secrets at rest.
    pub bot_secret_key: String,
}

impl Secrets {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Ok(Self {
            database_url: required_env("DATABASE_URL")?,
            redis_url: required_env("REDIS_URL")?,
            session_signing_key: required_env("SESSION_SIGNING_KEY")?,
            notification_push_key: required_env("NOTIFICATION_PUSH_KEY")?,
            steam_web_api_key: required_env("STEAM_WEB_API_KEY")?,
            bot_secret_key: required_env("BOT_SECRET_KEY")?,
        })
    }
}

fn required_env(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingSecret(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let settings = Settings::default();
        assert_eq!(settings.trade_timeout_seconds, 86_400);
        assert_eq!(settings.await_leg_timeout_seconds, 1_800);
        assert_eq!(settings.steam_rate_limit_per_minute, 20);
        assert_eq!(settings.platform_fee_percent, Decimal::new(50, 1));
    }
}
