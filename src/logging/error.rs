use thiserror::Error;

/// Errors produced by the log engine and its storage layer
#[derive(Debug, Error)]
pub enum LogEngineError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The log database could not be opened or repaired; nothing is stored
    #[error("log database is not available")]
    Unavailable,

    /// The engine stopped before a queued job could report back
    #[error("log engine stopped before the job completed")]
    Canceled,

    #[error("invalid log database configuration: {0}")]
    Config(String),

    #[error("broken log database schema: {0}")]
    Schema(String),

    #[error("invalid {kind} value {value}")]
    InvalidDiscriminant { kind: &'static str, value: i64 },

    #[error("unknown {kind} '{name}'")]
    UnknownName { kind: &'static str, name: String },

    #[error("invalid identifier: {0}")]
    InvalidId(#[from] uuid::Error),
}

pub type Result<T> = std::result::Result<T, LogEngineError>;
