pub mod agent;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod tracing;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::AgentConfig;
pub use error::{ExecutionError, GenerationError, Result, SchemaError, SqlmendError};
