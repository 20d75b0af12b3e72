use crate::agent::prompt::Feedback;
use crate::db::ResultSet;
use crate::error::ExecutionError;

pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// the record threaded through one invocation.
///
/// only the controller holds it, and only for the duration of one run. fields
/// are private so each can change only through the transition that owns it:
/// the question never changes, the schema is seeded once during init, each
/// attempt overwrites the sql, and an execution outcome sets either `result`
/// or `last_error`.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    question: String,
    schema_context: String,
    sql_query: Option<String>,
    last_error: Option<ExecutionError>,
    result: Option<ResultSet>,
    iteration_count: u32,
    max_iterations: u32,
}

impl WorkflowState {
    pub fn new(
        question: impl Into<String>,
        schema_context: impl Into<String>,
        max_iterations: u32,
    ) -> Self {
        Self {
            question: question.into(),
            schema_context: schema_context.into(),
            sql_query: None,
            last_error: None,
            result: None,
            iteration_count: 0,
            max_iterations,
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn schema_context(&self) -> &str {
        &self.schema_context
    }

    pub fn sql_query(&self) -> Option<&str> {
        self.sql_query.as_deref()
    }

    pub fn last_error(&self) -> Option<&ExecutionError> {
        self.last_error.as_ref()
    }

    pub fn result(&self) -> Option<&ResultSet> {
        self.result.as_ref()
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// the failed sql and its error, when the last attempt failed
    pub fn feedback(&self) -> Option<Feedback> {
        match (&self.sql_query, &self.last_error) {
            (Some(sql), Some(err)) => Some(Feedback {
                failed_sql: sql.clone(),
                error_message: err.message.clone(),
            }),
            _ => None,
        }
    }

    pub(crate) fn seed_schema(&mut self, schema_context: String) {
        self.schema_context = schema_context;
    }

    /// a generated statement starts a new attempt
    pub(crate) fn begin_attempt(&mut self, sql: String) {
        self.sql_query = Some(sql);
        self.iteration_count += 1;
    }

    pub(crate) fn record_success(&mut self, result: ResultSet) {
        self.last_error = None;
        self.result = Some(result);
    }

    pub(crate) fn record_failure(&mut self, error: ExecutionError) {
        self.last_error = Some(error);
    }

    pub(crate) fn into_parts(self) -> (Option<String>, Option<ResultSet>, Option<ExecutionError>) {
        (self.sql_query, self.result, self.last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_empty() {
        let state = WorkflowState::new("q", "schema", DEFAULT_MAX_ITERATIONS);
        assert_eq!(state.iteration_count(), 0);
        assert_eq!(state.max_iterations(), 3);
        assert!(state.sql_query().is_none());
        assert!(state.feedback().is_none());
    }

    #[test]
    fn test_attempt_overwrites_sql() {
        let mut state = WorkflowState::new("q", "schema", 3);
        state.begin_attempt("SELECT a".to_string());
        state.record_failure(ExecutionError::new("no such column: a"));
        state.begin_attempt("SELECT b".to_string());

        assert_eq!(state.sql_query(), Some("SELECT b"));
        assert_eq!(state.iteration_count(), 2);
    }

    #[test]
    fn test_success_clears_error() {
        let mut state = WorkflowState::new("q", "schema", 3);
        state.begin_attempt("SELECT a".to_string());
        state.record_failure(ExecutionError::new("boom"));

        let feedback = state.feedback().unwrap();
        assert_eq!(feedback.failed_sql, "SELECT a");
        assert_eq!(feedback.error_message, "boom");

        state.begin_attempt("SELECT 1".to_string());
        state.record_success(ResultSet::default());
        assert!(state.last_error().is_none());
        assert!(state.result().is_some());
        assert!(state.feedback().is_none());
    }
}
