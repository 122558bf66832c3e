use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use escrow_types::{EscrowError, Listing, ListingStatus};

/// Storage seam for listings. Kept deliberately thin: the engine only ever
/// needs to read a listing's immutable fields and flip its `status` between
/// `active`/`reserved` as a trade progresses or falls through.
#[async_trait]
pub trait ListingStore: std::fmt::Debug + Send + Sync + 'static {
    async fn get(&self, id: i64) -> Result<Listing, EscrowError>;

    /// Compare-and-set on `status`, failing with `PreconditionFailed` if the
    /// listing is no longer in `expected` (e.g. two buyers racing the same
    /// listing, testable property S4's sibling for listings).
    async fn set_status(&self, id: i64, expected: ListingStatus, next: ListingStatus) -> Result<Listing, EscrowError>;
}

#[derive(Debug, Default)]
pub struct InMemoryListingStore {
    inner: Mutex<HashMap<i64, Listing>>,
}

impl InMemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, listing: Listing) {
        self.inner.lock().unwrap().insert(listing.id, listing);
    }
}

#[async_trait]
impl ListingStore for InMemoryListingStore {
    async fn get(&self, id: i64) -> Result<Listing, EscrowError> {
        self.inner.lock().unwrap().get(&id).cloned().ok_or_else(|| EscrowError::NotFound(format!("listing {id}")))
    }

    async fn set_status(&self, id: i64, expected: ListingStatus, next: ListingStatus) -> Result<Listing, EscrowError> {
        let mut inner = self.inner.lock().unwrap();
        let listing = inner.get_mut(&id).ok_or_else(|| EscrowError::NotFound(format!("listing {id}")))?;
        if listing.status != expected {
            return Err(EscrowError::PreconditionFailed);
        }
        listing.status = next;
        listing.updated_at = chrono::Utc::now();
        Ok(listing.clone())
    }
}
