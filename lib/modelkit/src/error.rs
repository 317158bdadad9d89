use thiserror::Error;

/// Result type alias for record operations.
pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Error, Debug)]
pub enum ModelError {
    /// Placeholder count mismatch or unparseable operator syntax.
    #[error("Malformed condition: {0}")]
    MalformedCondition(String),

    /// Connection or statement failure reported by the session backend.
    #[error("Session error: {0}")]
    Session(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Invalid page request: page {page}, size {size}")]
    InvalidPageRequest { page: u64, size: u64 },

    /// An update or delete without conditions that was not explicitly allowed.
    #[error("Refusing to {0} every row without conditions")]
    MissingConditions(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected value: {0}")]
    UnexpectedValue(String),
}

impl ModelError {
    pub fn malformed(message: impl Into<String>) -> Self {
        ModelError::MalformedCondition(message.into())
    }

    pub fn session(message: impl Into<String>) -> Self {
        ModelError::Session(message.into())
    }

    /// True for failures raised by the database layer.
    pub fn is_session_failure(&self) -> bool {
        matches!(self, ModelError::Session(_))
    }
}
