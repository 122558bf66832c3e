//! Postgres implementation of `escrow_engine::listing_store::ListingStore`.

use async_trait::async_trait;
use escrow_engine::listing_store::ListingStore;
use escrow_types::{EscrowError, ItemSnapshot, Listing, ListingStatus};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::mapping::{listing_kind_from_str, listing_kind_to_str, listing_status_from_str, listing_status_to_str};
use crate::{sticker_set_from_row, to_escrow_error};

#[derive(Debug, Clone)]
pub struct PgListingStore {
    pool: PgPool,
}

impl PgListingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_listing(row: &PgRow) -> Result<Listing, EscrowError> {
    let kind_str: String = row.try_get("kind").map_err(to_escrow_error)?;
    let status_str: String = row.try_get("status").map_err(to_escrow_error)?;

    Ok(Listing {
        id: row.try_get("id").map_err(to_escrow_error)?,
        seller_steam_id: row.try_get::<i64, _>("seller_steam_id").map_err(to_escrow_error)? as u64,
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
        price: row.try_get("price").map_err(to_escrow_error)?,
        currency: row.try_get("currency").map_err(to_escrow_error)?,
        kind: listing_kind_from_str(&kind_str)
            .ok_or_else(|| EscrowError::Internal(format!("unknown listing kind in db: {kind_str}")))?,
        status: listing_status_from_str(&status_str)
            .ok_or_else(|| EscrowError::Internal(format!("unknown listing status in db: {status_str}")))?,
        views: row.try_get("views").map_err(to_escrow_error)?,
        is_featured: row.try_get("is_featured").map_err(to_escrow_error)?,
        seller_delivery_trade_url: row.try_get("seller_delivery_trade_url").map_err(to_escrow_error)?,
        created_at: row.try_get("created_at").map_err(to_escrow_error)?,
        updated_at: row.try_get("updated_at").map_err(to_escrow_error)?,
    })
}

#[async_trait]
impl ListingStore for PgListingStore {
    async fn get(&self, id: i64) -> Result<Listing, EscrowError> {
        let row = sqlx::query("SELECT * FROM listings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(to_escrow_error)?
            .ok_or_else(|| EscrowError::NotFound(format!("listing {id}")))?;
        row_to_listing(&row)
    }

    async fn set_status(&self, id: i64, expected: ListingStatus, next: ListingStatus) -> Result<Listing, EscrowError> {
        let row = sqlx::query(
            "UPDATE listings SET status = $3, updated_at = now() WHERE id = $1 AND status = $2 RETURNING *",
        )
        .bind(id)
        .bind(listing_status_to_str(expected))
        .bind(listing_status_to_str(next))
        .fetch_optional(&self.pool)
        .await
        .map_err(to_escrow_error)?;

        match row {
            Some(row) => row_to_listing(&row),
            None => {
                // Either the listing doesn't exist, or it exists but is no
                // longer in `expected` — distinguish so callers get the
                // right error for their retry logic.
                self.get(id).await?;
                Err(EscrowError::PreconditionFailed)
            }
        }
    }
}

/// Inserts a new listing row, returning the id the database assigned; used
/// by `POST /listings`.
pub async fn insert_listing(pool: &PgPool, listing: &Listing) -> Result<i64, EscrowError> {
    let sticker_set = serde_json::to_value(&listing.item.sticker_set).unwrap_or_default();
    let row = sqlx::query(
        r#"
        INSERT INTO listings (
            seller_steam_id, asset_id, market_hash_name, app_id, context_id, icon_url,
            rarity, exterior, float_value, sticker_set, price, currency, kind, status,
            views, is_featured, seller_delivery_trade_url, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
        RETURNING id
        "#,
    )
    .bind(listing.seller_steam_id as i64)
    .bind(&listing.item.asset_id)
    .bind(&listing.item.market_hash_name)
    .bind(listing.item.app_id as i32)
    .bind(&listing.item.context_id)
    .bind(&listing.item.icon_url)
    .bind(&listing.item.rarity)
    .bind(&listing.item.exterior)
    .bind(&listing.item.float_value)
    .bind(sticker_set)
    .bind(listing.price)
    .bind(&listing.currency)
    .bind(listing_kind_to_str(listing.kind))
    .bind(listing_status_to_str(listing.status))
    .bind(listing.views)
    .bind(listing.is_featured)
    .bind(&listing.seller_delivery_trade_url)
    .bind(listing.created_at)
    .bind(listing.updated_at)
    .fetch_one(pool)
    .await
    .map_err(to_escrow_error)?;
    row.try_get("id").map_err(to_escrow_error)
}

/// Applies a seller's edit (`PATCH /listings/:id`): price and/or featured
/// flag. Ownership/active-status checks are the caller's (trade engine
/// boundary), not this repository's.
pub async fn update_listing(
    pool: &PgPool,
    id: i64,
    price: Option<rust_decimal::Decimal>,
    is_featured: Option<bool>,
) -> Result<Listing, EscrowError> {
    let row = sqlx::query(
        r#"
        UPDATE listings SET
            price = COALESCE($2, price),
            is_featured = COALESCE($3, is_featured),
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(price)
    .bind(is_featured)
    .fetch_optional(pool)
    .await
    .map_err(to_escrow_error)?
    .ok_or_else(|| EscrowError::NotFound(format!("listing {id}")))?;
    row_to_listing(&row)
}
