use crate::db::ResultSet;
use crate::error::{ExecutionError, GenerationError, SchemaError};
use serde::{Deserialize, Serialize};

/// why an invocation aborted without exhausting its budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatalCause {
    Schema(SchemaError),
    Generation(GenerationError),
}

/// terminal state of one invocation
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success {
        sql: String,
        result: ResultSet,
        iterations: u32,
    },
    /// every permitted attempt failed in the database
    Exhausted {
        sql: Option<String>,
        error: Option<ExecutionError>,
        iterations: u32,
    },
    Fatal {
        cause: FatalCause,
        sql: Option<String>,
        iterations: u32,
    },
    Cancelled {
        iterations: u32,
    },
}

impl Outcome {
    pub fn iterations(&self) -> u32 {
        match self {
            Outcome::Success { iterations, .. }
            | Outcome::Exhausted { iterations, .. }
            | Outcome::Fatal { iterations, .. }
            | Outcome::Cancelled { iterations } => *iterations,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Schema,
    Generation,
    ExhaustedRetries,
    Cancelled,
    /// the invocation itself crashed before it could report
    Internal,
}

/// caller-facing description of a failed invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
    /// whether running the same question again could plausibly succeed
    pub retryable: bool,
}

/// what `Controller::run` hands back; exactly one of `result` / `error` is set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub final_sql: Option<String>,
    pub result: Option<ResultSet>,
    pub error: Option<ErrorDescriptor>,
    pub iterations_used: u32,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }

    /// report for an invocation that died without producing an outcome
    pub fn aborted(message: impl Into<String>) -> Self {
        RunReport {
            final_sql: None,
            result: None,
            error: Some(ErrorDescriptor {
                kind: ErrorKind::Internal,
                message: message.into(),
                retryable: false,
            }),
            iterations_used: 0,
        }
    }
}

impl From<Outcome> for RunReport {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success {
                sql,
                result,
                iterations,
            } => RunReport {
                final_sql: Some(sql),
                result: Some(result),
                error: None,
                iterations_used: iterations,
            },
            Outcome::Exhausted {
                sql,
                error,
                iterations,
            } => RunReport {
                final_sql: sql,
                result: None,
                error: Some(ErrorDescriptor {
                    kind: ErrorKind::ExhaustedRetries,
                    message: error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "no attempts were permitted".to_string()),
                    retryable: true,
                }),
                iterations_used: iterations,
            },
            Outcome::Fatal {
                cause,
                sql,
                iterations,
            } => {
                let (kind, message, retryable) = match cause {
                    FatalCause::Schema(e) => {
                        let retryable = matches!(e, SchemaError::Timeout(_));
                        (ErrorKind::Schema, e.to_string(), retryable)
                    }
                    FatalCause::Generation(e) => {
                        let retryable =
                            matches!(e, GenerationError::Timeout(_) | GenerationError::Model(_));
                        (ErrorKind::Generation, e.to_string(), retryable)
                    }
                };
                RunReport {
                    final_sql: sql,
                    result: None,
                    error: Some(ErrorDescriptor {
                        kind,
                        message,
                        retryable,
                    }),
                    iterations_used: iterations,
                }
            }
            Outcome::Cancelled { iterations } => RunReport {
                final_sql: None,
                result: None,
                error: Some(ErrorDescriptor {
                    kind: ErrorKind::Cancelled,
                    message: "invocation was cancelled".to_string(),
                    retryable: true,
                }),
                iterations_used: iterations,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exhausted_report_keeps_last_sql_and_error() {
        let report = RunReport::from(Outcome::Exhausted {
            sql: Some("SELECT c FROM t".to_string()),
            error: Some(ExecutionError::new("no such column: c")),
            iterations: 3,
        });

        assert_eq!(report.final_sql.as_deref(), Some("SELECT c FROM t"));
        assert_eq!(report.iterations_used, 3);
        let error = report.error.unwrap();
        assert_eq!(error.kind, ErrorKind::ExhaustedRetries);
        assert_eq!(error.message, "no such column: c");
    }

    #[test]
    fn test_fatal_generation_report() {
        let report = RunReport::from(Outcome::Fatal {
            cause: FatalCause::Generation(GenerationError::NoStatement),
            sql: None,
            iterations: 0,
        });

        let error = report.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Generation);
        assert!(!error.retryable);
        assert!(report.result.is_none());
    }

    #[test]
    fn test_cancelled_report_exposes_no_state() {
        let report = RunReport::from(Outcome::Cancelled { iterations: 2 });
        assert!(report.final_sql.is_none());
        assert!(report.result.is_none());
        assert_eq!(report.error.unwrap().kind, ErrorKind::Cancelled);
    }

    #[test]
    fn test_aborted_report() {
        let report = RunReport::aborted("task panicked");
        assert!(!report.is_success());
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["error"]["kind"], json!("internal"));
        assert_eq!(value["error"]["retryable"], json!(false));
    }

    #[test]
    fn test_report_serializes_kind_snake_case() {
        let report = RunReport::from(Outcome::Cancelled { iterations: 0 });
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["error"]["kind"], json!("cancelled"));
        assert_eq!(value["iterations_used"], json!(0));
    }
}
