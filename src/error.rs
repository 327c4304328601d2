use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlTemplateError {
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Template load error: {0}")]
    TemplateLoad(String),

    #[error("Unsupported clause: {0}")]
    UnsupportedClause(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Ran out of parameters: {placeholders} placeholders, {params} parameters")]
    PlaceholderUnderflow { placeholders: usize, params: usize },

    #[error("Streaming session cancelled")]
    Cancelled,

    #[error("No row acknowledgment within {0:?}")]
    AckTimeout(Duration),
}

impl SqlTemplateError {
    /// True for faults raised while checking a connection out of the pool.
    #[must_use]
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, SqlTemplateError::ConnectionError(_))
    }

    /// True for faults reported by the database while running a resolved statement.
    #[must_use]
    pub fn is_execution_fault(&self) -> bool {
        matches!(
            self,
            SqlTemplateError::SqliteError(_) | SqlTemplateError::ExecutionError(_)
        )
    }
}

impl From<bb8::RunError<rusqlite::Error>> for SqlTemplateError {
    fn from(err: bb8::RunError<rusqlite::Error>) -> Self {
        match err {
            bb8::RunError::User(e) => {
                SqlTemplateError::ConnectionError(format!("sqlite connect error: {e}"))
            }
            bb8::RunError::TimedOut => {
                SqlTemplateError::ConnectionError("sqlite checkout timed out".into())
            }
        }
    }
}
