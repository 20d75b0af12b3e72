use crate::error::GenerationError;
use once_cell::sync::Lazy;
use regex::Regex;

// an opening fence with an optional info string on its own line, up to the next closing fence
static FENCE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[ \t]*[A-Za-z0-9_+.-]*[ \t]*\r?\n(.*?)```").unwrap()
});

static COMMENT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)--[^\n]*|/\*.*?\*/").unwrap());

/// true when nothing but comments, semicolons and whitespace remain
fn has_no_statement(sql: &str) -> bool {
    COMMENT_REGEX
        .replace_all(sql, " ")
        .trim_matches(|c: char| c == ';' || c.is_whitespace())
        .is_empty()
}

/// pull the statement out of a model response.
///
/// the first complete fenced block wins, whatever its label. without one,
/// the whole trimmed response is the statement.
pub fn extract_sql(response: &str) -> Result<String, GenerationError> {
    let text = response.trim();

    if text.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }

    let sql = match FENCE_REGEX.captures(text) {
        Some(captures) => captures.get(1).map(|m| m.as_str()).unwrap_or("").trim(),
        None => text,
    };

    if has_no_statement(sql) {
        return Err(GenerationError::NoStatement);
    }

    Ok(sql.to_string())
}
