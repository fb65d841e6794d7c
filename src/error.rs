//! Error types for table construction, query execution and action dispatch

use thiserror::Error;

/// Errors raised by a data source adapter
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SourceError {
    pub fn invalid_field(msg: impl Into<String>) -> Self {
        Self::InvalidField(msg.into())
    }

    pub fn invalid_condition(msg: impl Into<String>) -> Self {
        Self::InvalidCondition(msg.into())
    }

    pub fn record_not_found(msg: impl Into<String>) -> Self {
        Self::RecordNotFound(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }
}

/// Failure reported by an optional collaborator; logged, never surfaced
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HookError(pub String);

impl HookError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Errors surfaced by the table engine
#[derive(Debug, Error)]
pub enum TableError {
    #[error("Duplicate {kind} key: {key}")]
    DuplicateKey { kind: &'static str, key: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Query execution failed: {0}")]
    QueryExecution(#[source] SourceError),

    #[error("Action '{action}' failed: {source}")]
    ActionExecution {
        action: String,
        #[source]
        source: SourceError,
    },

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Invalid configuration file: {0}")]
    Config(#[from] toml::de::Error),
}

impl TableError {
    pub fn duplicate_key(kind: &'static str, key: impl Into<String>) -> Self {
        Self::DuplicateKey {
            kind,
            key: key.into(),
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Build-time errors that should never be recovered from at request time
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::DuplicateKey { .. } | Self::Configuration(_) | Self::Config(_)
        )
    }
}

impl From<SourceError> for TableError {
    fn from(err: SourceError) -> Self {
        Self::QueryExecution(err)
    }
}

pub type Result<T> = std::result::Result<T, TableError>;
