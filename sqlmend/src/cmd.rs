use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use common::agent::{run_batch, Controller, RunReport};
use common::db::{SchemaProvider, SqliteDatabase, SqliteOpenMode};
use common::llm::{ChatTemplate, CommandModel};
use common::AgentConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "sqlmend")]
#[command(about = "answer questions with generated sql, repairing failed queries", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one question against a database
    Ask {
        /// Question in natural language
        #[arg(short, long)]
        question: String,

        #[command(flatten)]
        database: DatabaseArgs,

        #[command(flatten)]
        agent: AgentArgs,

        /// Print the full report as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },
    /// Answer every line of a file as a separate question, one JSON report per line
    Batch {
        /// File with one question per line
        #[arg(long)]
        questions: PathBuf,

        /// Questions answered at the same time
        #[arg(long, default_value = "4")]
        concurrency: usize,

        #[command(flatten)]
        database: DatabaseArgs,

        #[command(flatten)]
        agent: AgentArgs,
    },
    /// Print the schema description the model is given
    Schema {
        #[command(flatten)]
        database: DatabaseArgs,
    },
}

#[derive(Args)]
struct DatabaseArgs {
    /// SQLite database file
    #[arg(short, long, env = "SQLMEND_DATABASE")]
    database: PathBuf,

    /// Let generated statements modify the database
    #[arg(long, default_value = "false")]
    allow_writes: bool,
}

#[derive(Args)]
struct AgentArgs {
    /// Program (and arguments) that reads a prompt on stdin and prints a completion
    #[arg(long, env = "SQLMEND_MODEL_COMMAND")]
    model_command: String,

    /// Chat template used to flatten messages into the prompt
    #[arg(long, default_value = "llama2")]
    template: ChatTemplate,

    /// Maximum generate/execute attempts
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Seconds to wait for one model call
    #[arg(long)]
    generation_timeout: Option<u64>,

    /// Seconds to wait for one statement
    #[arg(long)]
    execution_timeout: Option<u64>,
}

impl Cli {
    /// returns whether every invocation succeeded
    pub async fn execute(self) -> Result<bool> {
        let _guard = common::tracing::init_tracing("sqlmend")?;

        match self.command {
            Commands::Ask {
                question,
                database,
                agent,
                json,
            } => {
                let controller = build_controller(&database, &agent)?;
                let cancel = cancel_on_ctrl_c();

                let report = controller
                    .run_with_cancel(&question, controller.max_iterations(), &cancel)
                    .await;

                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    print_report(&report);
                }
                Ok(report.is_success())
            }
            Commands::Batch {
                questions,
                concurrency,
                database,
                agent,
            } => {
                let text = std::fs::read_to_string(&questions)
                    .with_context(|| format!("reading {}", questions.display()))?;
                let questions: Vec<String> = text
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect();

                let controller = Arc::new(build_controller(&database, &agent)?);
                let max_iterations = controller.max_iterations();
                let reports = run_batch(
                    controller,
                    questions,
                    max_iterations,
                    concurrency,
                    cancel_on_ctrl_c(),
                )
                .await;

                let mut all_succeeded = true;
                for (question, report) in &reports {
                    all_succeeded &= report.is_success();
                    println!(
                        "{}",
                        serde_json::json!({ "question": question, "report": report })
                    );
                }
                Ok(all_succeeded)
            }
            Commands::Schema { database } => {
                let config = merge_database_flags(AgentConfig::from_env()?, &database);
                let db = open_database(&database, &config)?;
                println!("{}", db.schema_description()?);
                Ok(true)
            }
        }
    }
}

/// the connection must be writable whenever the merged policy allows writes,
/// whether that came from `--allow-writes` or `SQLMEND_ALLOW_WRITES`
fn open_mode(config: &AgentConfig) -> SqliteOpenMode {
    if config.read_only {
        SqliteOpenMode::ReadOnly
    } else {
        SqliteOpenMode::ReadWrite
    }
}

fn open_database(args: &DatabaseArgs, config: &AgentConfig) -> Result<SqliteDatabase> {
    SqliteDatabase::open(&args.database, open_mode(config))
        .with_context(|| format!("opening {}", args.database.display()))
}

/// command-line flags win over the environment
fn merge_flags(mut config: AgentConfig, database: &DatabaseArgs, agent: &AgentArgs) -> AgentConfig {
    if let Some(n) = agent.max_iterations {
        config.max_iterations = n;
    }
    if let Some(secs) = agent.generation_timeout {
        config.generation_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = agent.execution_timeout {
        config.execution_timeout = Duration::from_secs(secs);
    }
    merge_database_flags(config, database)
}

fn merge_database_flags(mut config: AgentConfig, database: &DatabaseArgs) -> AgentConfig {
    config.read_only = config.read_only && !database.allow_writes;
    config
}

fn build_controller(database: &DatabaseArgs, agent: &AgentArgs) -> Result<Controller> {
    let config = merge_flags(AgentConfig::from_env()?, database, agent);

    let db = Arc::new(open_database(database, &config)?.with_policy(config.sql_policy()));
    let model = Arc::new(CommandModel::from_command_line(&agent.model_command, agent.template)?);

    tracing::info!(
        database = %database.database.display(),
        max_iterations = config.max_iterations,
        read_only = config.read_only,
        "controller ready"
    );

    Ok(Controller::new(db.clone(), model, db, &config))
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            token.cancel();
        }
    });
    cancel
}

fn print_report(report: &RunReport) {
    if let Some(sql) = &report.final_sql {
        eprintln!("sql ({} attempt(s)):\n{}\n", report.iterations_used, sql);
    }

    if let Some(result) = &report.result {
        match result.rows_affected {
            Some(n) => println!("{} row(s) affected", n),
            None => {
                println!("{}", result.columns.join("\t"));
                for row in &result.rows {
                    let cells: Vec<String> = row
                        .iter()
                        .map(|v| match v {
                            serde_json::Value::String(s) => s.clone(),
                            serde_json::Value::Null => "NULL".to_string(),
                            other => other.to_string(),
                        })
                        .collect();
                    println!("{}", cells.join("\t"));
                }
            }
        }
    }

    if let Some(error) = &report.error {
        eprintln!("error ({:?}): {}", error.kind, error.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn database_args(allow_writes: bool) -> DatabaseArgs {
        DatabaseArgs {
            database: PathBuf::from("answers.db"),
            allow_writes,
        }
    }

    fn agent_args() -> AgentArgs {
        AgentArgs {
            model_command: "cat".to_string(),
            template: ChatTemplate::Plain,
            max_iterations: None,
            generation_timeout: None,
            execution_timeout: None,
        }
    }

    #[test]
    fn test_env_allowed_writes_open_read_write() {
        let env_config = AgentConfig {
            read_only: false,
            ..AgentConfig::default()
        };

        let config = merge_flags(env_config, &database_args(false), &agent_args());
        assert!(!config.read_only);
        assert_eq!(open_mode(&config), SqliteOpenMode::ReadWrite);
    }

    #[test]
    fn test_flag_allows_writes() {
        let config = merge_flags(AgentConfig::default(), &database_args(true), &agent_args());
        assert_eq!(open_mode(&config), SqliteOpenMode::ReadWrite);
    }

    #[test]
    fn test_defaults_open_read_only() {
        let config = merge_flags(AgentConfig::default(), &database_args(false), &agent_args());
        assert!(config.read_only);
        assert_eq!(open_mode(&config), SqliteOpenMode::ReadOnly);
    }

    #[test]
    fn test_flags_override_env() {
        let agent = AgentArgs {
            max_iterations: Some(5),
            execution_timeout: Some(2),
            ..agent_args()
        };

        let config = merge_flags(AgentConfig::default(), &database_args(false), &agent);
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.execution_timeout, Duration::from_secs(2));
        assert_eq!(config.generation_timeout, AgentConfig::default().generation_timeout);
    }

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
