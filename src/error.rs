// src/error.rs
// Crate-wide error taxonomy for the memory and runtime core.

use thiserror::Error;

/// Error taxonomy shared by the Store, Memory Engine, Conversation Log,
/// Lane Queue, and Runtime Dispatcher.
#[derive(Error, Debug)]
pub enum PrometheusError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database schema is ahead of the known migration registry (found {found}, known {known})")]
    SchemaAhead { found: usize, known: usize },

    #[error("migration {name} failed: {cause}")]
    MigrationFailed { name: String, cause: String },

    #[error("provider auth rejected: {0}")]
    ProviderAuth(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("context too long for model: {0}")]
    ContextTooLong(String),

    #[error("aborted by caller")]
    UserAbort,

    #[error("fallback chain exhausted after {} attempt(s)", attempts.len())]
    FallbackExhausted { attempts: Vec<crate::runtime::AttemptRecord> },

    #[error("fatal: {0}")]
    Fatal(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PrometheusError>;

impl From<tokio::task::JoinError> for PrometheusError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            PrometheusError::UserAbort
        } else {
            PrometheusError::Fatal(err.to_string())
        }
    }
}

impl From<deadpool_sqlite::InteractError> for PrometheusError {
    fn from(err: deadpool_sqlite::InteractError) -> Self {
        PrometheusError::Fatal(err.to_string())
    }
}

impl From<deadpool_sqlite::PoolError> for PrometheusError {
    fn from(err: deadpool_sqlite::PoolError) -> Self {
        PrometheusError::Fatal(err.to_string())
    }
}
