use crate::db::{Database, ResultSet};
use crate::error::ExecutionError;
use std::sync::Arc;
use std::time::Duration;

/// runs a generated statement exactly once; no retries happen here
pub struct QueryExecutor {
    db: Arc<dyn Database>,
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(db: Arc<dyn Database>, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    #[tracing::instrument(skip(self, sql), fields(sql_len = sql.len()))]
    pub async fn execute(&self, sql: &str) -> Result<ResultSet, ExecutionError> {
        let db = Arc::clone(&self.db);
        let statement = sql.to_string();
        let call = tokio::task::spawn_blocking(move || db.execute(&statement));

        let outcome = match tokio::time::timeout(self.timeout, call).await {
            Ok(joined) => {
                joined.map_err(|e| ExecutionError::new(format!("task join error: {}", e)))?
            }
            Err(_) => {
                // the blocking call still owns the connection; stop it so the next attempt can run
                self.db.interrupt();
                Err(ExecutionError::timeout(self.timeout))
            }
        };

        match &outcome {
            Ok(rs) => tracing::info!(rows = rs.row_count(), "statement executed"),
            Err(e) => tracing::warn!(error = %e, "statement rejected"),
        }

        outcome
    }
}
