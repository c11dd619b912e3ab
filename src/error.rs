// ⚠️ Error types for import and storage

use thiserror::Error;

/// Batch-level import failure. Per-row problems never surface here.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Zero bytes, or a source with no rows at all
    #[error("Uploaded file is empty")]
    EmptySource,

    /// Bytes that cannot be decoded as tabular data
    #[error("Failed to read SWIFT codes from {format} file: {reason}")]
    Unreadable { format: &'static str, reason: String },

    #[error("Unsupported source file: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SWIFT code already exists in database: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
