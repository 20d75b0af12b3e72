pub const SQL_SYSTEM_PROMPT: &str =
    "you translate questions into a single sqlite query. \
     use only the tables and columns in the provided schema. \
     output exactly one sql statement in a ```sql fenced block. \
     no commentary, no multiple statements.";

/// what a failed attempt hands to the next one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub failed_sql: String,
    pub error_message: String,
}

pub fn build_generation_prompt(
    question: &str,
    schema_context: &str,
    prior: Option<&Feedback>,
) -> String {
    let schema_text = if schema_context.trim().is_empty() {
        "(no tables found)"
    } else {
        schema_context
    };

    let mut prompt = format!(
        "write one sql query that answers the question.\n\
         - use only tables and columns from the schema.\n\
         - return only the query.\n\n\
         schema:\n{}\n\nquestion:\n{}",
        schema_text, question
    );

    if let Some(feedback) = prior {
        prompt.push_str(&format!(
            "\n\nyour previous query failed.\n\n\
             previous query:\n{}\n\n\
             database error:\n{}\n\n\
             fix the fault the error points at in the previous query. \
             keep what was correct instead of starting over.",
            feedback.failed_sql, feedback.error_message
        ));
    }

    prompt
}
