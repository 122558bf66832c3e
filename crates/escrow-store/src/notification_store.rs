//! Postgres implementation of `escrow_notify::store::NotificationStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use escrow_notify::store::NotificationStore;
use escrow_types::{EscrowError, Notification, NotificationStatus};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::mapping::{notification_kind_from_str, notification_kind_to_str, notification_status_from_str, notification_status_to_str};
use crate::to_escrow_error;

#[derive(Debug, Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_notification(row: &PgRow) -> Result<Notification, EscrowError> {
    let kind_str: String = row.try_get("kind").map_err(to_escrow_error)?;
    let status_str: String = row.try_get("status").map_err(to_escrow_error)?;
    Ok(Notification {
        id: row.try_get("id").map_err(to_escrow_error)?,
        recipient_steam_id: row.try_get::<i64, _>("user_steam_id").map_err(to_escrow_error)? as u64,
        kind: notification_kind_from_str(&kind_str)
            .ok_or_else(|| EscrowError::Internal(format!("unknown notification kind in db: {kind_str}")))?,
        payload: row.try_get("payload").map_err(to_escrow_error)?,
        status: notification_status_from_str(&status_str)
            .ok_or_else(|| EscrowError::Internal(format!("unknown notification status in db: {status_str}")))?,
        created_at: row.try_get("created_at").map_err(to_escrow_error)?,
        delivered_at: row.try_get("delivered_at").map_err(to_escrow_error)?,
        read_at: row.try_get("read_at").map_err(to_escrow_error)?,
    })
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn insert(&self, notification: Notification) -> Result<(), EscrowError> {
        sqlx::query(
            "INSERT INTO notifications (id, user_steam_id, kind, payload, status, created_at, delivered_at, read_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(notification.id)
        .bind(notification.recipient_steam_id as i64)
        .bind(notification_kind_to_str(notification.kind))
        .bind(&notification.payload)
        .bind(notification_status_to_str(notification.status))
        .bind(notification.created_at)
        .bind(notification.delivered_at)
        .bind(notification.read_at)
        .execute(&self.pool)
        .await
        .map_err(to_escrow_error)?;
        Ok(())
    }

    async fn mark_delivered(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), EscrowError> {
        let result = sqlx::query(
            "UPDATE notifications SET status = $2, delivered_at = $3 WHERE id = $1 AND status = $4",
        )
        .bind(id)
        .bind(notification_status_to_str(NotificationStatus::Delivered))
        .bind(at)
        .bind(notification_status_to_str(NotificationStatus::Pending))
        .execute(&self.pool)
        .await
        .map_err(to_escrow_error)?;
        if result.rows_affected() == 0 {
            sqlx::query("SELECT id FROM notifications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(to_escrow_error)?
                .ok_or_else(|| EscrowError::NotFound(format!("notification {id}")))?;
        }
        Ok(())
    }

    async fn mark_read(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), EscrowError> {
        let result = sqlx::query("UPDATE notifications SET status = $2, read_at = $3 WHERE id = $1")
            .bind(id)
            .bind(notification_status_to_str(NotificationStatus::Read))
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(to_escrow_error)?;
        if result.rows_affected() == 0 {
            return Err(EscrowError::NotFound(format!("notification {id}")));
        }
        Ok(())
    }

    async fn pending_for_user(&self, recipient_steam_id: u64) -> Result<Vec<Notification>, EscrowError> {
        let rows = sqlx::query(
            "SELECT * FROM notifications WHERE user_steam_id = $1 AND status = $2 ORDER BY created_at ASC",
        )
        .bind(recipient_steam_id as i64)
        .bind(notification_status_to_str(NotificationStatus::Pending))
        .fetch_all(&self.pool)
        .await
        .map_err(to_escrow_error)?;
        rows.iter().map(row_to_notification).collect()
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, EscrowError> {
        let cutoff = now - Notification::RETENTION;
        let result = sqlx::query("DELETE FROM notifications WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(to_escrow_error)?;
        Ok(result.rows_affected())
    }
}
