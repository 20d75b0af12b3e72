use crate::agent::parser::extract_sql;
use crate::agent::prompt::{build_generation_prompt, Feedback, SQL_SYSTEM_PROMPT};
use crate::error::GenerationError;
use crate::llm::model::{CompletionModel, Message};
use std::sync::Arc;
use std::time::Duration;

/// turns a question (and, on retries, the last failure) into one sql statement
pub struct QueryGenerator {
    model: Arc<dyn CompletionModel>,
    timeout: Duration,
}

impl QueryGenerator {
    pub fn new(model: Arc<dyn CompletionModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    pub fn build_messages(
        question: &str,
        schema_context: &str,
        prior: Option<&Feedback>,
    ) -> Vec<Message> {
        vec![
            Message::system(SQL_SYSTEM_PROMPT),
            Message::user(build_generation_prompt(question, schema_context, prior)),
        ]
    }

    #[tracing::instrument(
        skip(self, question, schema_context, prior),
        fields(llm.model = %self.model.name(), retry = prior.is_some())
    )]
    pub async fn generate(
        &self,
        question: &str,
        schema_context: &str,
        prior: Option<&Feedback>,
    ) -> Result<String, GenerationError> {
        let messages = Self::build_messages(question, schema_context, prior);

        // dropping the call on timeout releases whatever the model holds
        let output = match tokio::time::timeout(self.timeout, self.model.complete(&messages)).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "model call timed out");
                return Err(GenerationError::Timeout(self.timeout));
            }
        };

        let sql = extract_sql(&output)?;
        tracing::debug!(sql_length = sql.len(), "extracted sql statement");
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedModel;

    #[tokio::test]
    async fn test_generate_extracts_fenced_sql() {
        let model = Arc::new(ScriptedModel::new(vec![Ok(
            "sure:\n```sql\nSELECT COUNT(*) FROM sales;\n```".to_string(),
        )]));
        let generator = QueryGenerator::new(model.clone(), Duration::from_secs(5));

        let sql = generator.generate("how many sales", "schema", None).await.unwrap();
        assert_eq!(sql, "SELECT COUNT(*) FROM sales;");
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_retry_prompt_contains_feedback() {
        let model = Arc::new(ScriptedModel::new(vec![Ok("SELECT 1".to_string())]));
        let generator = QueryGenerator::new(model.clone(), Duration::from_secs(5));
        let feedback = Feedback {
            failed_sql: "SELECT nope FROM sales".to_string(),
            error_message: "no such column: nope".to_string(),
        };

        generator.generate("q", "schema", Some(&feedback)).await.unwrap();

        let prompt = model.last_user_prompt().unwrap();
        assert!(prompt.contains("SELECT nope FROM sales"));
        assert!(prompt.contains("no such column: nope"));
    }

    #[tokio::test]
    async fn test_model_error_is_surfaced() {
        let model = Arc::new(ScriptedModel::new(vec![Err(GenerationError::Model(
            "401 unauthorized".to_string(),
        ))]));
        let generator = QueryGenerator::new(model, Duration::from_secs(5));

        let err = generator.generate("q", "schema", None).await.unwrap_err();
        assert_eq!(err, GenerationError::Model("401 unauthorized".to_string()));
    }

    #[tokio::test]
    async fn test_empty_output_is_generation_error() {
        let model = Arc::new(ScriptedModel::new(vec![Ok("  ".to_string())]));
        let generator = QueryGenerator::new(model, Duration::from_secs(5));

        let err = generator.generate("q", "schema", None).await.unwrap_err();
        assert_eq!(err, GenerationError::EmptyResponse);
    }

    #[tokio::test]
    async fn test_slow_model_times_out() {
        let model = Arc::new(
            ScriptedModel::new(vec![Ok("SELECT 1".to_string())])
                .with_delay(Duration::from_millis(500)),
        );
        let generator = QueryGenerator::new(model, Duration::from_millis(20));

        let err = generator.generate("q", "schema", None).await.unwrap_err();
        assert_eq!(err, GenerationError::Timeout(Duration::from_millis(20)));
    }
}
