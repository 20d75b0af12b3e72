use crate::agent::executor::QueryExecutor;
use crate::agent::generator::QueryGenerator;
use crate::agent::outcome::{FatalCause, Outcome, RunReport};
use crate::agent::router::{decide, Route};
use crate::agent::state::WorkflowState;
use crate::config::AgentConfig;
use crate::db::{Database, SchemaProvider};
use crate::error::SchemaError;
use crate::llm::model::CompletionModel;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// where the loop is between transitions
#[derive(Debug)]
enum Phase {
    Init,
    Generating,
    Executing(String),
    Routing,
    Done(Terminal),
}

#[derive(Debug)]
enum Terminal {
    Success,
    Exhausted,
    Fatal(FatalCause),
    Cancelled,
}

/// drives generate -> execute -> route until a terminal state.
///
/// collaborators are injected and shared; each call to `run` owns a fresh
/// `WorkflowState`, so concurrent invocations never see each other.
pub struct Controller {
    schema: Arc<dyn SchemaProvider>,
    generator: QueryGenerator,
    executor: QueryExecutor,
    schema_timeout: Duration,
    max_iterations: u32,
}

impl Controller {
    pub fn new(
        schema: Arc<dyn SchemaProvider>,
        model: Arc<dyn CompletionModel>,
        db: Arc<dyn Database>,
        config: &AgentConfig,
    ) -> Self {
        Self {
            schema,
            generator: QueryGenerator::new(model, config.generation_timeout),
            executor: QueryExecutor::new(db, config.execution_timeout),
            schema_timeout: config.schema_timeout,
            max_iterations: config.max_iterations,
        }
    }

    /// the configured attempt budget
    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub async fn run(&self, question: &str, max_iterations: u32) -> RunReport {
        self.run_with_cancel(question, max_iterations, &CancellationToken::new())
            .await
    }

    pub async fn run_with_cancel(
        &self,
        question: &str,
        max_iterations: u32,
        cancel: &CancellationToken,
    ) -> RunReport {
        self.drive(question, max_iterations, cancel).await.into()
    }

    #[tracing::instrument(
        skip(self, question, cancel),
        fields(invocation.id = %uuid::Uuid::new_v4())
    )]
    pub async fn drive(
        &self,
        question: &str,
        max_iterations: u32,
        cancel: &CancellationToken,
    ) -> Outcome {
        let mut state = WorkflowState::new(question, String::new(), max_iterations);
        let mut phase = Phase::Init;

        let terminal = loop {
            phase = match phase {
                Phase::Init => self.init(&mut state, cancel).await,
                Phase::Generating => self.generating(&mut state, cancel).await,
                Phase::Executing(sql) => self.executing(&mut state, &sql, cancel).await,
                Phase::Routing => routing(&state),
                Phase::Done(terminal) => break terminal,
            };
        };

        finish(state, terminal)
    }

    async fn init(&self, state: &mut WorkflowState, cancel: &CancellationToken) -> Phase {
        if cancel.is_cancelled() {
            tracing::info!("cancelled before start");
            return Phase::Done(Terminal::Cancelled);
        }

        // fetched once; never refreshed mid-loop
        match self.fetch_schema().await {
            Ok(schema) => state.seed_schema(schema),
            Err(e) => {
                tracing::error!(error = %e, "schema retrieval failed");
                return Phase::Done(Terminal::Fatal(FatalCause::Schema(e)));
            }
        }

        if state.max_iterations() == 0 {
            Phase::Done(Terminal::Exhausted)
        } else {
            Phase::Generating
        }
    }

    async fn fetch_schema(&self) -> Result<String, SchemaError> {
        let provider = Arc::clone(&self.schema);
        let call = tokio::task::spawn_blocking(move || provider.schema_description());

        let schema = match tokio::time::timeout(self.schema_timeout, call).await {
            Ok(joined) => joined.map_err(|e| SchemaError::Task(e.to_string()))??,
            Err(_) => return Err(SchemaError::Timeout(self.schema_timeout)),
        };

        tracing::info!(schema_len = schema.len(), "schema context loaded");
        Ok(schema)
    }

    async fn generating(&self, state: &mut WorkflowState, cancel: &CancellationToken) -> Phase {
        if cancel.is_cancelled() {
            return Phase::Done(Terminal::Cancelled);
        }

        let feedback = state.feedback();
        let attempt = state.iteration_count() + 1;
        tracing::info!("generation attempt {}/{}", attempt, state.max_iterations());

        match self
            .generator
            .generate(state.question(), state.schema_context(), feedback.as_ref())
            .await
        {
            Ok(sql) => {
                state.begin_attempt(sql.clone());
                Phase::Executing(sql)
            }
            Err(e) => {
                tracing::error!(error = %e, attempt, "generation failed, aborting");
                Phase::Done(Terminal::Fatal(FatalCause::Generation(e)))
            }
        }
    }

    async fn executing(
        &self,
        state: &mut WorkflowState,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Phase {
        if cancel.is_cancelled() {
            return Phase::Done(Terminal::Cancelled);
        }

        match self.executor.execute(sql).await {
            Ok(result) => state.record_success(result),
            Err(e) => {
                tracing::warn!("attempt {} failed: {}", state.iteration_count(), e);
                state.record_failure(e);
            }
        }

        Phase::Routing
    }
}

fn routing(state: &WorkflowState) -> Phase {
    match decide(state) {
        Route::Continue => Phase::Generating,
        Route::StopSuccess => {
            tracing::info!("query succeeded on attempt {}", state.iteration_count());
            Phase::Done(Terminal::Success)
        }
        Route::StopExhausted => {
            tracing::warn!("no attempts left after {}", state.iteration_count());
            Phase::Done(Terminal::Exhausted)
        }
    }
}

fn finish(state: WorkflowState, terminal: Terminal) -> Outcome {
    let iterations = state.iteration_count();
    let (sql, result, error) = state.into_parts();

    match terminal {
        Terminal::Success => match (sql, result) {
            (Some(sql), Some(result)) => Outcome::Success {
                sql,
                result,
                iterations,
            },
            // the router reports success only once a result is recorded
            (sql, _) => Outcome::Exhausted {
                sql,
                error,
                iterations,
            },
        },
        Terminal::Exhausted => Outcome::Exhausted {
            sql,
            error,
            iterations,
        },
        Terminal::Fatal(cause) => Outcome::Fatal {
            cause,
            sql,
            iterations,
        },
        Terminal::Cancelled => Outcome::Cancelled { iterations },
    }
}
