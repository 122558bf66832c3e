//! Postgres implementation of `escrow_engine::trade_store::TradeStore`.
//!
//! `transition` is the one place spec.md §4.3's row lock lives: `SELECT ...
//! FOR UPDATE` inside a transaction, held only for the duration of the
//! write (never across the Steam call the caller already made before
//! invoking this), matching §5's "transitions hold a row lock only for the
//! duration of the DB transaction".

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use escrow_engine::trade_store::TradeStore;
use escrow_types::{Actor, EscrowError, HistoryRow, ItemSnapshot, Pricing, Trade, TradeStatus};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::mapping::{trade_status_from_str, trade_status_to_str};
use crate::{sticker_set_from_row, to_escrow_error};

#[derive(Debug, Clone)]
pub struct PgTradeStore {
    pool: PgPool,
}

impl PgTradeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_trade(row: &PgRow) -> Result<Trade, EscrowError> {
    let status_str: String = row.try_get("status").map_err(to_escrow_error)?;
    let status = trade_status_from_str(&status_str)
        .ok_or_else(|| EscrowError::Internal(format!("unknown trade status in db: {status_str}")))?;

    Ok(Trade {
        id: row.try_get("id").map_err(to_escrow_error)?,
        listing_id: row.try_get("listing_id").map_err(to_escrow_error)?,
        buyer_steam_id: row.try_get::<i64, _>("buyer_steam_id").map_err(to_escrow_error)? as u64,
        seller_steam_id: row.try_get::<i64, _>("seller_steam_id").map_err(to_escrow_error)? as u64,
        assigned_bot_steam_id: row.try_get::<Option<i64>, _>("assigned_bot_steam_id").map_err(to_escrow_error)?.map(|v| v as u64),
        item: ItemSnapshot {
            asset_id: row.try_get("asset_id").map_err(to_escrow_error)?,
            market_hash_name: row.try_get("market_hash_name").map_err(to_escrow_error)?,
            app_id: row.try_get::<i32, _>("app_id").map_err(to_escrow_error)? as u32,
            context_id: row.try_get("context_id").map_err(to_escrow_error)?,
            icon_url: row.try_get("icon_url").map_err(to_escrow_error)?,
            rarity: row.try_get("rarity").map_err(to_escrow_error)?,
            exterior: row.try_get("exterior").map_err(to_escrow_error)?,
            float_value: row.try_get("float_value").map_err(to_escrow_error)?,
            sticker_set: sticker_set_from_row(row, "sticker_set")?,
        },
        pricing: Pricing {
            price: row.try_get("price").map_err(to_escrow_error)?,
            fee_percent: row.try_get("fee_percent").map_err(to_escrow_error)?,
            platform_fee: row.try_get("platform_fee").map_err(to_escrow_error)?,
            seller_payout: row.try_get("seller_payout").map_err(to_escrow_error)?,
        },
        currency: row.try_get("currency").map_err(to_escrow_error)?,
        seller_offer_id: row.try_get("seller_offer_id").map_err(to_escrow_error)?,
        buyer_offer_id: row.try_get("buyer_offer_id").map_err(to_escrow_error)?,
        status,
        cancel_requested: row.try_get("cancel_requested").map_err(to_escrow_error)?,
        cancel_reason: row.try_get("cancel_reason").map_err(to_escrow_error)?,
        retry_count: row.try_get("retry_count").map_err(to_escrow_error)?,
        notes: row.try_get("notes").map_err(to_escrow_error)?,
        payment_received_at: row.try_get("payment_received_at").map_err(to_escrow_error)?,
        seller_offer_sent_at: row.try_get("seller_offer_sent_at").map_err(to_escrow_error)?,
        seller_offer_responded_at: row.try_get("seller_offer_responded_at").map_err(to_escrow_error)?,
        buyer_offer_sent_at: row.try_get("buyer_offer_sent_at").map_err(to_escrow_error)?,
        buyer_offer_responded_at: row.try_get("buyer_offer_responded_at").map_err(to_escrow_error)?,
        completed_at: row.try_get("completed_at").map_err(to_escrow_error)?,
        expires_at: row.try_get("expires_at").map_err(to_escrow_error)?,
        created_at: row.try_get("created_at").map_err(to_escrow_error)?,
        updated_at: row.try_get("updated_at").map_err(to_escrow_error)?,
    })
}

#[async_trait]
impl TradeStore for PgTradeStore {
    async fn insert(&self, trade: Trade) -> Result<(), EscrowError> {
        let mut tx = self.pool.begin().await.map_err(to_escrow_error)?;
        let sticker_set = serde_json::to_value(&trade.item.sticker_set).unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO escrow_trades (
                id, listing_id, buyer_steam_id, seller_steam_id, assigned_bot_steam_id,
                asset_id, market_hash_name, app_id, context_id, icon_url, rarity, exterior,
                float_value, sticker_set, price, fee_percent, platform_fee, seller_payout,
                currency, seller_offer_id, buyer_offer_id, status, cancel_requested,
                cancel_reason, retry_count, notes, payment_received_at, seller_offer_sent_at,
                seller_offer_responded_at, buyer_offer_sent_at, buyer_offer_responded_at,
                completed_at, expires_at, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32, $33,
                $34, $35
            )
            "#,
        )
        .bind(trade.id)
        .bind(trade.listing_id)
        .bind(trade.buyer_steam_id as i64)
        .bind(trade.seller_steam_id as i64)
        .bind(trade.assigned_bot_steam_id.map(|v| v as i64))
        .bind(&trade.item.asset_id)
        .bind(&trade.item.market_hash_name)
        .bind(trade.item.app_id as i32)
        .bind(&trade.item.context_id)
        .bind(&trade.item.icon_url)
        .bind(&trade.item.rarity)
        .bind(&trade.item.exterior)
        .bind(&trade.item.float_value)
        .bind(sticker_set)
        .bind(trade.pricing.price)
        .bind(trade.pricing.fee_percent)
        .bind(trade.pricing.platform_fee)
        .bind(trade.pricing.seller_payout)
        .bind(&trade.currency)
        .bind(&trade.seller_offer_id)
        .bind(&trade.buyer_offer_id)
        .bind(trade_status_to_str(trade.status))
        .bind(trade.cancel_requested)
        .bind(&trade.cancel_reason)
        .bind(trade.retry_count)
        .bind(&trade.notes)
        .bind(trade.payment_received_at)
        .bind(trade.seller_offer_sent_at)
        .bind(trade.seller_offer_responded_at)
        .bind(trade.buyer_offer_sent_at)
        .bind(trade.buyer_offer_responded_at)
        .bind(trade.completed_at)
        .bind(trade.expires_at)
        .bind(trade.created_at)
        .bind(trade.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(to_escrow_error)?;

        insert_history(&mut tx, trade.id, None, trade.status, Actor::System, Some("trade created"), trade.created_at).await?;
        tx.commit().await.map_err(to_escrow_error)
    }

    async fn get(&self, id: Uuid) -> Result<Trade, EscrowError> {
        let row = sqlx::query("SELECT * FROM escrow_trades WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(to_escrow_error)?
            .ok_or_else(|| EscrowError::NotFound(format!("trade {id}")))?;
        row_to_trade(&row)
    }

    async fn due_for_reconciliation(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Trade>, EscrowError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM escrow_trades
            WHERE status NOT IN ('completed', 'cancelled', 'refunded', 'expired')
              AND (
                    expires_at <= $1
                    OR cancel_requested
                    OR status IN ('awaiting_seller', 'awaiting_buyer', 'error_sending', 'error_forwarding', 'payment_received')
                  )
            ORDER BY updated_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(to_escrow_error)?;

        rows.iter().map(row_to_trade).collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        mutate: Box<dyn FnOnce(&Trade) -> Result<Trade, EscrowError> + Send>,
    ) -> Result<Trade, EscrowError> {
        let mut tx = self.pool.begin().await.map_err(to_escrow_error)?;

        let row = sqlx::query("SELECT * FROM escrow_trades WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(to_escrow_error)?
            .ok_or_else(|| EscrowError::NotFound(format!("trade {id}")))?;
        let current = row_to_trade(&row)?;

        let next = mutate(&current)?;

        if next.status != current.status && !current.status.can_transition_to(next.status) {
            return Err(EscrowError::PreconditionFailed);
        }

        sqlx::query(
            r#"
            UPDATE escrow_trades SET
                assigned_bot_steam_id = $2, seller_offer_id = $3, buyer_offer_id = $4,
                status = $5, cancel_requested = $6, cancel_reason = $7, retry_count = $8,
                notes = $9, payment_received_at = $10, seller_offer_sent_at = $11,
                seller_offer_responded_at = $12, buyer_offer_sent_at = $13,
                buyer_offer_responded_at = $14, completed_at = $15, expires_at = $16,
                updated_at = $17
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(next.assigned_bot_steam_id.map(|v| v as i64))
        .bind(&next.seller_offer_id)
        .bind(&next.buyer_offer_id)
        .bind(trade_status_to_str(next.status))
        .bind(next.cancel_requested)
        .bind(&next.cancel_reason)
        .bind(next.retry_count)
        .bind(&next.notes)
        .bind(next.payment_received_at)
        .bind(next.seller_offer_sent_at)
        .bind(next.seller_offer_responded_at)
        .bind(next.buyer_offer_sent_at)
        .bind(next.buyer_offer_responded_at)
        .bind(next.completed_at)
        .bind(next.expires_at)
        .bind(next.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(to_escrow_error)?;

        if next.status != current.status {
            insert_history(&mut tx, id, Some(current.status), next.status, Actor::System, next.notes.as_deref(), next.updated_at).await?;
        }

        tx.commit().await.map_err(to_escrow_error)?;
        Ok(next)
    }
}

async fn insert_history(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    trade_id: Uuid,
    previous: Option<TradeStatus>,
    new: TradeStatus,
    actor: Actor,
    notes: Option<&str>,
    at: DateTime<Utc>,
) -> Result<(), EscrowError> {
    sqlx::query(
        "INSERT INTO escrow_trade_history (trade_id, previous_status, new_status, actor, notes, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(trade_id)
    .bind(previous.map(trade_status_to_str))
    .bind(trade_status_to_str(new))
    .bind(crate::mapping::actor_to_str(actor))
    .bind(notes)
    .bind(at)
    .execute(&mut **tx)
    .await
    .map_err(to_escrow_error)?;
    Ok(())
}

/// Reads the history tail for `GET /trades/:uuid` (spec.md §6).
pub async fn history_for(pool: &PgPool, trade_id: Uuid, limit: i64) -> Result<Vec<HistoryRow>, EscrowError> {
    let rows = sqlx::query("SELECT * FROM escrow_trade_history WHERE trade_id = $1 ORDER BY created_at DESC LIMIT $2")
        .bind(trade_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(to_escrow_error)?;

    rows.iter()
        .map(|row| {
            Ok(HistoryRow {
                id: row.try_get("id").map_err(to_escrow_error)?,
                trade_id: row.try_get("trade_id").map_err(to_escrow_error)?,
                previous_status: row
                    .try_get::<Option<String>, _>("previous_status")
                    .map_err(to_escrow_error)?
                    .and_then(|s| trade_status_from_str(&s)),
                new_status: trade_status_from_str(&row.try_get::<String, _>("new_status").map_err(to_escrow_error)?)
                    .ok_or_else(|| EscrowError::Internal("unknown status in history row".into()))?,
                actor: crate::mapping::actor_from_str(&row.try_get::<String, _>("actor").map_err(to_escrow_error)?)
                    .ok_or_else(|| EscrowError::Internal("unknown actor in history row".into()))?,
                notes: row.try_get("notes").map_err(to_escrow_error)?,
                created_at: row.try_get("created_at").map_err(to_escrow_error)?,
            })
        })
        .collect()
}

/// Backs `GET /admin/trades?status=` (SPEC_FULL.md §6): an admin-only read
/// path outside the [`TradeStore`] seam, the same way `history_for` sits
/// beside it — neither needs a row lock or an in-memory fake.
pub async fn list_trades(pool: &PgPool, status: Option<TradeStatus>, limit: i64, offset: i64) -> Result<Vec<Trade>, EscrowError> {
    let rows = match status {
        Some(status) => {
            sqlx::query("SELECT * FROM escrow_trades WHERE status = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3")
                .bind(trade_status_to_str(status))
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await
        }
        None => {
            sqlx::query("SELECT * FROM escrow_trades ORDER BY created_at DESC LIMIT $1 OFFSET $2")
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await
        }
    }
    .map_err(to_escrow_error)?;

    rows.iter().map(row_to_trade).collect()
}
