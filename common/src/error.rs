use thiserror::Error;
use tokio::task::JoinError;

/// Error taxonomy for the ticket ingestion pipeline.
///
/// `TransientRemote`/`PermanentRemote` are not distinguished at the type level;
/// callers classify an HTTP failure via [`AppError::is_retryable`] the same way
/// the pipeline classifies a database write conflict.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Vector store index misconfigured: {0}")]
    IndexMismatch(String),
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Authorization error: {0}")]
    Auth(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP transport error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Remote API error ({status}): {body}")]
    RemoteApi { status: u16, body: String },
    #[error("Partial enrichment failure for ticket {ticket_id}: {reason}")]
    PartialEnrichment { ticket_id: String, reason: String },
    #[error("Audit write failed: {0}")]
    AuditWrite(String),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Ingestion processing error: {0}")]
    Processing(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Whether a remote-facing failure is worth retrying.
    ///
    /// Network transport errors, request timeouts, 429s and 5xx responses are
    /// retryable; any other 4xx is treated as permanent. Mirrors the
    /// conflict/no-conflict split the pipeline uses for database writes.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Reqwest(err) => {
                err.is_timeout() || err.is_connect() || err.is_request()
            }
            AppError::RemoteApi { status, .. } => *status == 429 || *status >= 500,
            AppError::Database(err) => is_retryable_conflict(&err.to_string()),
            _ => false,
        }
    }
}

/// Detects SurrealDB's transient read/write conflict error so retry loops can
/// distinguish it from a permanent failure.
#[must_use]
pub fn is_retryable_conflict(message: &str) -> bool {
    message.contains("read or write conflict") || message.contains("Transaction is cancelled")
}
