//! SQLite-backed database client and schema provider.

use crate::db::{Database, ResultSet, SchemaProvider, SqlPolicy};
use crate::error::{ExecutionError, Result, SchemaError};
use rusqlite::limits::Limit;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, InterruptHandle, OpenFlags};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const BUSY_TIMEOUT_MS: u64 = 100;

// sqlite's compiled-in default for SQLITE_LIMIT_ATTACHED
const DEFAULT_ATTACHED_LIMIT: i32 = 10;

const SCHEMA_QUERY: &str = "SELECT sql FROM sqlite_master \
     WHERE sql IS NOT NULL AND type IN ('table', 'view', 'index') \
     AND name NOT LIKE 'sqlite_%' \
     ORDER BY CASE type WHEN 'table' THEN 0 WHEN 'view' THEN 1 ELSE 2 END, name";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SqliteOpenMode {
    ReadOnly,
    ReadWrite,
}

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
    interrupt: InterruptHandle,
    policy: SqlPolicy,
}

/// a read-only connection may not attach other files: ATTACH creates a
/// missing file even when the statement itself counts as read-only
fn apply_policy(conn: &Connection, policy: SqlPolicy) -> rusqlite::Result<()> {
    let attached = match policy {
        SqlPolicy::ReadOnly => 0,
        SqlPolicy::AllowWrites => DEFAULT_ATTACHED_LIMIT,
    };
    conn.set_limit(Limit::SQLITE_LIMIT_ATTACHED, attached)?;
    Ok(())
}

impl SqliteDatabase {
    /// open a database file. read-only mode also sets `query_only`, so the
    /// connection refuses writes even if the policy were loosened later.
    pub fn open(path: &Path, mode: SqliteOpenMode) -> Result<Self> {
        let flags = match mode {
            SqliteOpenMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
            SqliteOpenMode::ReadWrite => {
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            }
        };
        let conn = Connection::open_with_flags(path, flags)?;
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;

        let policy = match mode {
            SqliteOpenMode::ReadOnly => {
                conn.pragma_update(None, "query_only", 1)?;
                SqlPolicy::ReadOnly
            }
            SqliteOpenMode::ReadWrite => SqlPolicy::AllowWrites,
        };
        apply_policy(&conn, policy)?;

        tracing::info!(path = %path.display(), ?mode, "opened sqlite database");

        Ok(Self {
            interrupt: conn.get_interrupt_handle(),
            conn: Mutex::new(conn),
            policy,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            interrupt: conn.get_interrupt_handle(),
            conn: Mutex::new(conn),
            policy: SqlPolicy::AllowWrites,
        })
    }

    pub fn with_policy(mut self, policy: SqlPolicy) -> Self {
        if let Ok(conn) = self.conn.get_mut() {
            if let Err(e) = apply_policy(conn, policy) {
                tracing::warn!(error = %e, "failed to apply attach limit");
            }
        }
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> SqlPolicy {
        self.policy
    }

    /// run a script of statements directly, bypassing the policy. used for seeding.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    fn lock(&self) -> std::result::Result<MutexGuard<'_, Connection>, ExecutionError> {
        self.conn
            .lock()
            .map_err(|_| ExecutionError::new("database connection lock poisoned"))
    }
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => {
            Value::String(bytes.iter().map(|b| format!("{:02x}", b)).collect())
        }
    }
}

impl Database for SqliteDatabase {
    #[tracing::instrument(skip(self, sql), fields(sql_len = sql.len()))]
    fn execute(&self, sql: &str) -> std::result::Result<ResultSet, ExecutionError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;

        // statements without result columns (ATTACH, BEGIN, pragma assignments)
        // change connection state even when sqlite reports them read-only
        let column_count = stmt.column_count();
        if self.policy == SqlPolicy::ReadOnly && (!stmt.readonly() || column_count == 0) {
            tracing::warn!("refusing statement that writes to the database");
            return Err(ExecutionError::read_only_violation());
        }

        if column_count == 0 {
            let affected = stmt.execute([])?;
            return Ok(ResultSet {
                columns: Vec::new(),
                rows: Vec::new(),
                rows_affected: Some(affected),
            });
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                values.push(value_to_json(row.get_ref(idx)?));
            }
            rows.push(values);
        }

        tracing::debug!(rows = rows.len(), columns = column_count, "statement returned rows");

        Ok(ResultSet {
            columns,
            rows,
            rows_affected: None,
        })
    }

    fn interrupt(&self) {
        tracing::debug!("interrupting running statement");
        self.interrupt.interrupt();
    }
}

impl SchemaProvider for SqliteDatabase {
    fn schema_description(&self) -> std::result::Result<String, SchemaError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| SchemaError::Introspection("database connection lock poisoned".to_string()))?;

        let introspection = |e: rusqlite::Error| SchemaError::Introspection(e.to_string());

        let mut stmt = conn.prepare(SCHEMA_QUERY).map_err(introspection)?;
        let statements = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(introspection)?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(introspection)?;

        Ok(statements
            .iter()
            .map(|s| format!("{};", s.trim()))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}
