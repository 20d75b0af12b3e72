use std::time::Duration;
use thiserror::Error;

/// schema retrieval failed; fatal for the whole invocation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema introspection failed: {0}")]
    Introspection(String),

    #[error("schema retrieval timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("schema task failed: {0}")]
    Task(String),
}

/// the model call failed or its output held no statement; never retried
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("model error: {0}")]
    Model(String),

    #[error("model call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("model returned empty output")]
    EmptyResponse,

    #[error("model output did not contain a sql statement")]
    NoStatement,
}

/// the database rejected a statement.
///
/// `message` is the driver's text, untouched. it is what the next generation
/// attempt sees as feedback, so nothing here rewrites or shortens it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(format!("query timed out after {}ms", after.as_millis()))
    }

    pub fn read_only_violation() -> Self {
        Self::new(
            "statement modifies the database; only read-only queries (SELECT) are permitted",
        )
    }
}

impl From<rusqlite::Error> for ExecutionError {
    fn from(e: rusqlite::Error) -> Self {
        Self::new(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum SqlmendError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("tracing initialization failed: {0}")]
    Tracing(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

pub type Result<T> = std::result::Result<T, SqlmendError>;
