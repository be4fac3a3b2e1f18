use thiserror::Error;

/// Low-level data errors that bubble up through the system.
///
/// Service-level errors wrap these; command handlers convert them to
/// `anyhow` with context.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    CorruptRow(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
