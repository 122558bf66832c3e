//! Postgres implementation of `escrow_audit::store::RiskStore`.

use async_trait::async_trait;
use escrow_audit::store::RiskStore;
use escrow_types::{EscrowError, RiskEvent, User};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::mapping::{risk_event_kind_from_str, risk_event_kind_to_str};
use crate::to_escrow_error;
use crate::wallet_store::row_to_user;

#[derive(Debug, Clone)]
pub struct PgRiskStore {
    pool: PgPool,
}

impl PgRiskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_risk_event(row: &PgRow) -> Result<RiskEvent, EscrowError> {
    let kind_str: String = row.try_get("kind").map_err(to_escrow_error)?;
    Ok(RiskEvent {
        id: row.try_get("id").map_err(to_escrow_error)?,
        user_steam_id: row.try_get::<i64, _>("user_steam_id").map_err(to_escrow_error)? as u64,
        kind: risk_event_kind_from_str(&kind_str)
            .ok_or_else(|| EscrowError::Internal(format!("unknown risk event kind in db: {kind_str}")))?,
        weight: row.try_get("weight").map_err(to_escrow_error)?,
        trade_id: row.try_get("trade_id").map_err(to_escrow_error)?,
        created_at: row.try_get("created_at").map_err(to_escrow_error)?,
    })
}

#[async_trait]
impl RiskStore for PgRiskStore {
    async fn apply_risk_event(&self, event: RiskEvent, threshold: i32) -> Result<User, EscrowError> {
        let mut tx = self.pool.begin().await.map_err(to_escrow_error)?;

        let row = sqlx::query("SELECT * FROM users WHERE steam_id = $1 FOR UPDATE")
            .bind(event.user_steam_id as i64)
            .fetch_optional(&mut *tx)
            .await
            .map_err(to_escrow_error)?
            .ok_or_else(|| EscrowError::NotFound(format!("user {}", event.user_steam_id)))?;
        let mut user = row_to_user(&row)?;

        user.risk_score += event.weight;
        if user.risk_score >= threshold {
            user.flagged_for_review = true;
        }

        sqlx::query("UPDATE users SET risk_score = $2, flagged_for_review = $3, updated_at = $4 WHERE steam_id = $1")
            .bind(event.user_steam_id as i64)
            .bind(user.risk_score)
            .bind(user.flagged_for_review)
            .bind(event.created_at)
            .execute(&mut *tx)
            .await
            .map_err(to_escrow_error)?;
        user.updated_at = event.created_at;

        sqlx::query(
            "INSERT INTO user_scam_logs (user_steam_id, kind, weight, trade_id, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(event.user_steam_id as i64)
        .bind(risk_event_kind_to_str(event.kind))
        .bind(event.weight)
        .bind(event.trade_id)
        .bind(event.created_at)
        .execute(&mut *tx)
        .await
        .map_err(to_escrow_error)?;

        tx.commit().await.map_err(to_escrow_error)?;
        Ok(user)
    }

    async fn get_user(&self, steam_id: u64) -> Result<User, EscrowError> {
        let row = sqlx::query("SELECT * FROM users WHERE steam_id = $1")
            .bind(steam_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(to_escrow_error)?
            .ok_or_else(|| EscrowError::NotFound(format!("user {steam_id}")))?;
        row_to_user(&row)
    }

    async fn events_for_user(&self, steam_id: u64) -> Result<Vec<RiskEvent>, EscrowError> {
        let rows = sqlx::query("SELECT * FROM user_scam_logs WHERE user_steam_id = $1 ORDER BY created_at DESC")
            .bind(steam_id as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(to_escrow_error)?;
        rows.iter().map(row_to_risk_event).collect()
    }
}
