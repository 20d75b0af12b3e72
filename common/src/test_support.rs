//! scripted collaborators for unit tests

use crate::db::{Database, ResultSet, SchemaProvider};
use crate::error::{ExecutionError, GenerationError, SchemaError};
use crate::llm::model::{CompletionModel, Message, MessageRole};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// replays canned completions in order and records every prompt it receives
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String, GenerationError>>>,
    prompts: Mutex<Vec<Vec<Message>>>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// the user message of every call, in call order
    pub fn user_prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter_map(|messages| {
                messages
                    .iter()
                    .find(|m| m.role == MessageRole::User)
                    .map(|m| m.content.clone())
            })
            .collect()
    }

    pub fn last_user_prompt(&self) -> Option<String> {
        self.user_prompts().pop()
    }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    async fn complete(&self, messages: &[Message]) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::Model("script exhausted".to_string())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// replays canned execution outcomes and records the statements it was given
pub struct ScriptedDatabase {
    responses: Mutex<VecDeque<Result<ResultSet, ExecutionError>>>,
    statements: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedDatabase {
    pub fn new(responses: Vec<Result<ResultSet, ExecutionError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            statements: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

impl Database for ScriptedDatabase {
    fn execute(&self, sql: &str) -> Result<ResultSet, ExecutionError> {
        self.statements.lock().unwrap().push(sql.to_string());
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ExecutionError::new("script exhausted")))
    }
}

pub struct FixedSchema(pub Result<String, SchemaError>);

impl SchemaProvider for FixedSchema {
    fn schema_description(&self) -> Result<String, SchemaError> {
        self.0.clone()
    }
}
