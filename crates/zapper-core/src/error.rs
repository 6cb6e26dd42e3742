//! Error types for file-zapper.

use thiserror::Error;

/// Result type alias using file-zapper's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for file-zapper operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Attachment row not found
    #[error("Attachment not found: {0}")]
    AttachmentNotFound(uuid::Uuid),

    /// Content bytes required by the caller are absent from the content store
    #[error("Content not found for attachment {0}")]
    ContentNotFound(uuid::Uuid),

    /// A row could not be removed because another row still references it
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// A save was rejected by validation or a table constraint
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A term identifier did not resolve to exactly one term
    #[error("Unresolved term: {0}")]
    UnresolvedTerm(String),

    /// Placeholder lookup or creation failed
    #[error("Placeholder error: {0}")]
    Placeholder(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error only affects the record being processed.
    ///
    /// Record-scoped errors are counted and skipped; anything else aborts the
    /// surrounding batch or sweep.
    pub fn is_record_scoped(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::AttachmentNotFound(_) | Error::ContentNotFound(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
