use thiserror::Error;

/// Errors raised by the package bridge
///
/// `Archive` and `Schema` are fatal: they abort the operation before
/// (or instead of) any database write. `RowMapping` and `Media` are
/// non-fatal: the offending row or file is skipped and the message is
/// collected into the operation report.
#[derive(Error, Debug)]
pub enum PackageError {
    #[error("Archive error: {0}")]
    Archive(String),
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Row mapping error: {0}")]
    RowMapping(String),
    #[error("Media error: {0}")]
    Media(String),
    #[error("Deck name not representable in package format: {0:?} contains '::'")]
    DeckName(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PackageError {
    /// Non-fatal errors are collected into the report instead of
    /// aborting the operation
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PackageError::RowMapping(_) | PackageError::Media(_))
    }
}
