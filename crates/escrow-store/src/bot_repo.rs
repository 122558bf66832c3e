//! Loads and persists bot rows. Deliberately stops short of constructing
//! `escrow_fleet::BotWorker`s itself — that needs a live `SteamClient`,
//! which is the orchestrator's job to wire up at startup.

use chrono::Utc;
use escrow_types::{Bot, BotSecrets, BotStatus, EscrowError};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::mapping::{bot_status_from_str, bot_status_to_str};
use crate::secrets::SecretBox;
use crate::to_escrow_error;

#[derive(Debug, Clone)]
pub struct BotRepository {
    pool: PgPool,
    secret_box: SecretBox,
}

fn row_to_bot(row: &PgRow) -> Result<Bot, EscrowError> {
    let status_str: String = row.try_get("status").map_err(to_escrow_error)?;
    Ok(Bot {
        steam_id: row.try_get::<i64, _>("steam_id").map_err(to_escrow_error)? as u64,
        account_name: row.try_get("account_name").map_err(to_escrow_error)?,
        status: bot_status_from_str(&status_str)
            .ok_or_else(|| EscrowError::Internal(format!("unknown bot status in db: {status_str}")))?,
        inventory_size: row.try_get("inventory_size").map_err(to_escrow_error)?,
        active_trade_count: row.try_get("active_trade_count").map_err(to_escrow_error)?,
        last_error: row.try_get("last_error").map_err(to_escrow_error)?,
        last_online_at: row.try_get("last_online_at").map_err(to_escrow_error)?,
        created_at: row.try_get("created_at").map_err(to_escrow_error)?,
        updated_at: row.try_get("updated_at").map_err(to_escrow_error)?,
    })
}

impl BotRepository {
    pub fn new(pool: PgPool, secret_box: SecretBox) -> Self {
        Self { pool, secret_box }
    }

    /// Loads every non-banned bot, paired with its decrypted secrets, for
    /// `FleetManager::initialize_all` to log into at startup.
    pub async fn load_fleet(&self) -> Result<Vec<(Bot, BotSecrets)>, EscrowError> {
        let rows = sqlx::query("SELECT * FROM bots WHERE status <> $1 ORDER BY steam_id")
            .bind(bot_status_to_str(BotStatus::Banned))
            .fetch_all(&self.pool)
            .await
            .map_err(to_escrow_error)?;

        rows.iter()
            .map(|row| {
                let bot = row_to_bot(row)?;
                let encrypted_password: Vec<u8> = row.try_get("encrypted_password").map_err(to_escrow_error)?;
                let encrypted_totp_secret: Vec<u8> = row.try_get("encrypted_totp_secret").map_err(to_escrow_error)?;
                let encrypted_identity_secret: Vec<u8> = row.try_get("encrypted_identity_secret").map_err(to_escrow_error)?;
                let secrets = BotSecrets {
                    account_name: bot.account_name.clone(),
                    password: self.secret_box.open(&encrypted_password)?,
                    totp_shared_secret: self.secret_box.open(&encrypted_totp_secret)?,
                    identity_secret: self.secret_box.open(&encrypted_identity_secret)?,
                };
                Ok((bot, secrets))
            })
            .collect()
    }

    pub async fn register(&self, secrets: &BotSecrets, steam_id: u64) -> Result<(), EscrowError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO bots (
                steam_id, account_name, encrypted_password, encrypted_totp_secret,
                encrypted_identity_secret, status, inventory_size, active_trade_count,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, 0, 0, $7, $7)
            "#,
        )
        .bind(steam_id as i64)
        .bind(&secrets.account_name)
        .bind(self.secret_box.seal(&secrets.password)?)
        .bind(self.secret_box.seal(&secrets.totp_shared_secret)?)
        .bind(self.secret_box.seal(&secrets.identity_secret)?)
        .bind(bot_status_to_str(BotStatus::Offline))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(to_escrow_error)?;
        Ok(())
    }

    /// Persists the in-memory fleet snapshot (status, load, last error)
    /// produced by `BotWorker::snapshot`, called periodically by the
    /// reconciler so a restart can resume from the last known state.
    pub async fn save_snapshot(&self, bot: &Bot) -> Result<(), EscrowError> {
        sqlx::query(
            r#"
            UPDATE bots SET
                status = $2, inventory_size = $3, active_trade_count = $4,
                last_error = $5, last_online_at = $6, updated_at = $7
            WHERE steam_id = $1
            "#,
        )
        .bind(bot.steam_id as i64)
        .bind(bot_status_to_str(bot.status))
        .bind(bot.inventory_size)
        .bind(bot.active_trade_count)
        .bind(&bot.last_error)
        .bind(bot.last_online_at)
        .bind(bot.updated_at)
        .execute(&self.pool)
        .await
        .map_err(to_escrow_error)?;
        Ok(())
    }
}
