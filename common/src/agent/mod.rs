pub mod batch;
pub mod controller;
pub mod executor;
pub mod generator;
pub mod outcome;
pub mod parser;
pub mod prompt;
pub mod router;
pub mod state;

pub use batch::run_batch;
pub use controller::Controller;
pub use executor::QueryExecutor;
pub use generator::QueryGenerator;
pub use outcome::{ErrorDescriptor, ErrorKind, FatalCause, Outcome, RunReport};
pub use parser::extract_sql;
pub use prompt::{build_generation_prompt, Feedback, SQL_SYSTEM_PROMPT};
pub use router::{decide, Route};
pub use state::{WorkflowState, DEFAULT_MAX_ITERATIONS};
