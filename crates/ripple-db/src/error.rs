use thiserror::Error;

/// Failure taxonomy of the store. Every public operation reports exactly one
/// of these; the API layer maps them onto HTTP statuses.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No resolved identity, or the identity is not a participant/owner of
    /// the targeted resource.
    #[error("unauthorized")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// A write would violate a uniqueness invariant (e.g. username taken).
    #[error("{0}")]
    Conflict(String),

    /// Rejected before any write happened.
    #[error("{0}")]
    Validation(String),

    /// A stored counter disagrees with its relation. Unreachable while the
    /// toggle invariants hold; surfaced loudly instead of clamped.
    #[error("counter corruption: {0}")]
    CounterCorruption(String),

    #[error("store lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
