use thiserror::Error;

/// Error taxonomy for store, codec, and controller operations.
///
/// `Validation` and `NotFound` abort before any persistence; `Storage` wraps
/// the underlying datastore cause; `Parse` rejects a whole BCF package with
/// the store untouched.
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {guid}")]
    NotFound { kind: &'static str, guid: String },

    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("malformed BCF package: {0}")]
    Parse(String),
}

impl Error {
    pub fn not_found(kind: &'static str, guid: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            guid: guid.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
