use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("dataset parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("tensor computation error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("model error: {0}")]
    Model(#[from] pylate_rs::ColbertError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),

    #[error("invalid listing '{id}': {reason}")]
    InvalidListing { id: String, reason: String },

    #[error("duplicate listing id: {0}")]
    DuplicateListing(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(
        "invalid weights: hard={hard}, semantic={semantic} (must be non-negative and sum to 1)"
    )]
    InvalidWeights { hard: f32, semantic: f32 },

    #[error("invalid threshold {0} (must be a non-negative number)")]
    InvalidThreshold(f32),

    #[error("invalid result limit {0} (must be a positive integer)")]
    InvalidTopK(usize),

    #[error("invalid penalty policy: {0}")]
    InvalidPolicy(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl Error {
    /// Whether this error is a caller bug (bad listing, query, weights,
    /// threshold, policy or vector shape) rather than an environment failure.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Error::InvalidListing { .. }
                | Error::DuplicateListing(_)
                | Error::InvalidQuery(_)
                | Error::InvalidWeights { .. }
                | Error::InvalidThreshold(_)
                | Error::InvalidTopK(_)
                | Error::InvalidPolicy(_)
                | Error::DimensionMismatch { .. }
        )
    }
}
