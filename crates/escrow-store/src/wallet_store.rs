//! Postgres implementation of `escrow_wallet::store::WalletStore`.
//!
//! Grounded on the same `afterburn-mexchange` accounts-repository shape as
//! `trade_store`: lock the mutable row with `SELECT ... FOR UPDATE`, run the
//! in-memory mutation, write it back inside the same transaction as the
//! ledger row it's paired with.

use async_trait::async_trait;
use escrow_types::{EscrowError, Transaction, TransactionKind, TransactionStatus, User};
use escrow_wallet::store::WalletStore;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::mapping::{transaction_kind_from_str, transaction_kind_to_str, transaction_status_from_str, transaction_status_to_str};
use crate::to_escrow_error;

#[derive(Debug, Clone)]
pub struct PgWalletStore {
    pool: PgPool,
}

impl PgWalletStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn row_to_user(row: &PgRow) -> Result<User, EscrowError> {
    Ok(User {
        steam_id: row.try_get::<i64, _>("steam_id").map_err(to_escrow_error)? as u64,
        display_name: row.try_get("display_name").map_err(to_escrow_error)?,
        avatar_url: row.try_get("avatar_url").map_err(to_escrow_error)?,
        delivery_trade_url: row.try_get("delivery_trade_url").map_err(to_escrow_error)?,
        balance: row.try_get("balance").map_err(to_escrow_error)?,
        reserved: row.try_get("reserved").map_err(to_escrow_error)?,
        risk_score: row.try_get("risk_score").map_err(to_escrow_error)?,
        flagged_for_review: row.try_get("flagged_for_review").map_err(to_escrow_error)?,
        banned: row.try_get("banned").map_err(to_escrow_error)?,
        created_at: row.try_get("created_at").map_err(to_escrow_error)?,
        updated_at: row.try_get("updated_at").map_err(to_escrow_error)?,
    })
}

fn row_to_transaction(row: &PgRow) -> Result<Transaction, EscrowError> {
    let kind_str: String = row.try_get("kind").map_err(to_escrow_error)?;
    let status_str: String = row.try_get("status").map_err(to_escrow_error)?;
    Ok(Transaction {
        id: row.try_get("id").map_err(to_escrow_error)?,
        trade_id: row.try_get("trade_id").map_err(to_escrow_error)?,
        subject_steam_id: row.try_get::<i64, _>("subject_steam_id").map_err(to_escrow_error)? as u64,
        kind: transaction_kind_from_str(&kind_str)
            .ok_or_else(|| EscrowError::Internal(format!("unknown transaction kind in db: {kind_str}")))?,
        amount: row.try_get("amount").map_err(to_escrow_error)?,
        currency: row.try_get("currency").map_err(to_escrow_error)?,
        status: transaction_status_from_str(&status_str)
            .ok_or_else(|| EscrowError::Internal(format!("unknown transaction status in db: {status_str}")))?,
        external_provider_ref: row.try_get("external_provider_ref").map_err(to_escrow_error)?,
        retry_count: row.try_get("retry_count").map_err(to_escrow_error)?,
        created_at: row.try_get("created_at").map_err(to_escrow_error)?,
    })
}

async fn insert_transaction(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    txn: &Transaction,
) -> Result<(), EscrowError> {
    sqlx::query(
        r#"
        INSERT INTO escrow_transactions (
            id, trade_id, subject_steam_id, kind, amount, currency, status,
            external_provider_ref, retry_count, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(txn.id)
    .bind(txn.trade_id)
    .bind(txn.subject_steam_id as i64)
    .bind(transaction_kind_to_str(txn.kind))
    .bind(txn.amount)
    .bind(&txn.currency)
    .bind(transaction_status_to_str(txn.status))
    .bind(&txn.external_provider_ref)
    .bind(txn.retry_count)
    .bind(txn.created_at)
    .execute(&mut **tx)
    .await
    .map_err(to_escrow_error)?;
    Ok(())
}

#[async_trait]
impl WalletStore for PgWalletStore {
    async fn get_user(&self, steam_id: u64) -> Result<User, EscrowError> {
        let row = sqlx::query("SELECT * FROM users WHERE steam_id = $1")
            .bind(steam_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(to_escrow_error)?
            .ok_or_else(|| EscrowError::NotFound(format!("user {steam_id}")))?;
        row_to_user(&row)
    }

    async fn apply(
        &self,
        steam_id: u64,
        txn: Transaction,
        mutate: Box<dyn FnOnce(&mut User) -> Result<(), EscrowError> + Send>,
    ) -> Result<User, EscrowError> {
        let mut tx = self.pool.begin().await.map_err(to_escrow_error)?;

        let row = sqlx::query("SELECT * FROM users WHERE steam_id = $1 FOR UPDATE")
            .bind(steam_id as i64)
            .fetch_optional(&mut *tx)
            .await
            .map_err(to_escrow_error)?
            .ok_or_else(|| EscrowError::NotFound(format!("user {steam_id}")))?;
        let mut user = row_to_user(&row)?;

        mutate(&mut user)?;

        if !user.is_invariant_satisfied() {
            return Err(EscrowError::Internal(format!("ledger invariant violated for user {steam_id}")));
        }

        sqlx::query(
            "UPDATE users SET balance = $2, reserved = $3, risk_score = $4, flagged_for_review = $5, banned = $6, updated_at = now() WHERE steam_id = $1",
        )
        .bind(steam_id as i64)
        .bind(user.balance)
        .bind(user.reserved)
        .bind(user.risk_score)
        .bind(user.flagged_for_review)
        .bind(user.banned)
        .execute(&mut *tx)
        .await
        .map_err(to_escrow_error)?;

        insert_transaction(&mut tx, &txn).await?;
        tx.commit().await.map_err(to_escrow_error)?;
        Ok(user)
    }

    async fn append_only(&self, txn: Transaction) -> Result<(), EscrowError> {
        let mut tx = self.pool.begin().await.map_err(to_escrow_error)?;
        insert_transaction(&mut tx, &txn).await?;
        tx.commit().await.map_err(to_escrow_error)
    }

    async fn find_posted_transaction(&self, trade_id: Uuid, kind: TransactionKind) -> Result<Option<Transaction>, EscrowError> {
        let row = sqlx::query("SELECT * FROM escrow_transactions WHERE trade_id = $1 AND kind = $2 AND status = $3")
            .bind(trade_id)
            .bind(transaction_kind_to_str(kind))
            .bind(transaction_status_to_str(TransactionStatus::Posted))
            .fetch_optional(&self.pool)
            .await
            .map_err(to_escrow_error)?;

        row.as_ref().map(row_to_transaction).transpose()
    }

    async fn transactions_for_user(&self, steam_id: u64) -> Result<Vec<Transaction>, EscrowError> {
        let rows = sqlx::query("SELECT * FROM escrow_transactions WHERE subject_steam_id = $1 ORDER BY created_at DESC")
            .bind(steam_id as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(to_escrow_error)?;
        rows.iter().map(row_to_transaction).collect()
    }

    async fn set_delivery_trade_url(&self, steam_id: u64, trade_url: String) -> Result<(), EscrowError> {
        sqlx::query("UPDATE users SET delivery_trade_url = $2, updated_at = now() WHERE steam_id = $1")
            .bind(steam_id as i64)
            .bind(trade_url)
            .execute(&self.pool)
            .await
            .map_err(to_escrow_error)?;
        Ok(())
    }
}
