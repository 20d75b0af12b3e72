pub mod sqlite;

use crate::error::{ExecutionError, SchemaError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use sqlite::{SqliteDatabase, SqliteOpenMode};

/// rows produced by one statement, in the order the database returned them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// set for statements that return no rows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<usize>,
}

impl ResultSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// which statements the executor will run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SqlPolicy {
    #[default]
    ReadOnly,
    AllowWrites,
}

/// runs one statement, once. connection lifecycle and error text belong to the implementor.
pub trait Database: Send + Sync {
    fn execute(&self, sql: &str) -> Result<ResultSet, ExecutionError>;

    /// abort whatever statement is running right now. called from another
    /// thread when the caller stops waiting; must not block.
    fn interrupt(&self) {}
}

/// describes the tables and columns a question may be answered from
pub trait SchemaProvider: Send + Sync {
    fn schema_description(&self) -> Result<String, SchemaError>;
}
