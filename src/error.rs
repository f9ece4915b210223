use thiserror::Error;

pub type Result<T> = std::result::Result<T, RankingError>;

/// Errors raised by the ranking and training code paths.
///
/// Cold start is deliberately absent: a user or listing with no trained
/// history yields empty or neutral results, never an error.
#[derive(Debug, Error)]
pub enum RankingError {
    #[error("insufficient training data: {count} interactions, {required} required")]
    InsufficientData { count: usize, required: usize },

    #[error("user-item matrix not built yet")]
    MatrixNotBuilt,

    #[error("feature vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures from the backing data store. Batch jobs treat these as
/// per-entity: log, skip the entity, keep the run alive.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),
}
