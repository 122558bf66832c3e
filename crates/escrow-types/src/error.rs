use thiserror::Error;

/// The error taxonomy from spec.md §7, shared by the Steam client's retry
/// predicate and the trade engine's escalation logic so the two call sites
/// judge transience/persistence the same way instead of duplicating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed input. Surfaced immediately; never retried.
    Validation,
    /// Not the owner, insufficient balance, listing not active. Not retried.
    Authorization,
    /// Steam 429/5xx, connection resets, KV timeouts. Retried with backoff.
    Transient,
    /// Steam 401/403, invalid trade url, item gone. Trade moves to
    /// `refunded`/`disputed`.
    Persistent,
    /// Ledger invariant violation, missing referenced row. Trade moves to
    /// `disputed`; never auto-refunded without human review.
    Internal,
}

#[derive(Debug, Error)]
pub enum EscrowError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("transient steam/network failure: {0}")]
    Transient(String),

    #[error("persistent external failure: {0}")]
    Persistent(String),

    #[error("internal inconsistency: {0}")]
    Internal(String),

    #[error("precondition failed: trade is not in the expected state")]
    PreconditionFailed,

    #[error("entity not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl EscrowError {
    pub fn class(&self) -> ErrorClass {
        match self {
            EscrowError::Validation(_) => ErrorClass::Validation,
            EscrowError::Authorization(_) => ErrorClass::Authorization,
            EscrowError::Transient(_) => ErrorClass::Transient,
            EscrowError::Persistent(_) => ErrorClass::Persistent,
            EscrowError::Internal(_) | EscrowError::Database(_) => ErrorClass::Internal,
            EscrowError::PreconditionFailed => ErrorClass::Authorization,
            EscrowError::NotFound(_) => ErrorClass::Validation,
        }
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self.class(), ErrorClass::Transient)
    }
}

/// A thin, dependency-free stand-in for the underlying store error so that
/// `escrow-types` does not need to depend on `sqlx`. `escrow-store` converts
/// its own `sqlx::Error` into this at the boundary.
#[derive(Debug, Error)]
#[error("store error: {0}")]
pub struct DbError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_is_the_only_retriable_class() {
        assert!(EscrowError::Transient("x".into()).is_retriable());
        assert!(!EscrowError::Persistent("x".into()).is_retriable());
        assert!(!EscrowError::Validation("x".into()).is_retriable());
        assert!(!EscrowError::Internal("x".into()).is_retriable());
    }
}
