//! Error taxonomy shared by every backend and caller.

use thiserror::Error;

use crate::types::ValidationError;

/// A failure inside a storage backend.
///
/// Backends wrap their own error types here so the engine stays
/// backend-agnostic.
#[derive(Debug, Error)]
#[error("{backend} storage error: {source}")]
pub struct StoreError {
    backend: &'static str,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl StoreError {
    /// Wraps a backend-specific error.
    pub fn new(
        backend: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            backend,
            source: source.into(),
        }
    }

    /// Name of the backend that failed.
    pub const fn backend(&self) -> &'static str {
        self.backend
    }
}

/// Engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The entity does not exist or belongs to another owner.
    #[error("not found")]
    NotFound,

    /// Malformed input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The caller's identity could not be resolved.
    #[error("unauthorized")]
    Unauthorized,

    /// Backend I/O or constraint failure.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl Error {
    /// HTTP status an API layer should answer with.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Validation(_) => 400,
            Self::Unauthorized => 401,
            Self::Storage(_) => 500,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
