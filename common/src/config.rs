use crate::agent::state::DEFAULT_MAX_ITERATIONS;
use crate::db::SqlPolicy;
use crate::error::{Result, SqlmendError};
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 120;
const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SCHEMA_TIMEOUT_SECS: u64 = 30;

/// knobs for one controller; shared by every invocation it runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub max_iterations: u32,
    pub generation_timeout: Duration,
    pub execution_timeout: Duration,
    pub schema_timeout: Duration,
    pub read_only: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            generation_timeout: Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS),
            execution_timeout: Duration::from_secs(DEFAULT_EXECUTION_TIMEOUT_SECS),
            schema_timeout: Duration::from_secs(DEFAULT_SCHEMA_TIMEOUT_SECS),
            read_only: true,
        }
    }
}

impl AgentConfig {
    /// read overrides from `SQLMEND_*` environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let max_iterations = parse_var(&lookup, "SQLMEND_MAX_ITERATIONS")?
            .unwrap_or(defaults.max_iterations);

        let generation_timeout = parse_var(&lookup, "SQLMEND_GENERATION_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.generation_timeout);

        let execution_timeout = parse_var(&lookup, "SQLMEND_EXECUTION_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.execution_timeout);

        let schema_timeout = parse_var(&lookup, "SQLMEND_SCHEMA_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.schema_timeout);

        let read_only = lookup("SQLMEND_ALLOW_WRITES")
            .filter(|s| !s.is_empty())
            .map(|v| !is_truthy(&v))
            .unwrap_or(defaults.read_only);

        Ok(Self {
            max_iterations,
            generation_timeout,
            execution_timeout,
            schema_timeout,
            read_only,
        })
    }

    pub fn sql_policy(&self) -> SqlPolicy {
        if self.read_only {
            SqlPolicy::ReadOnly
        } else {
            SqlPolicy::AllowWrites
        }
    }
}

pub(crate) fn is_truthy(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "1" || v == "true" || v == "yes"
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key).filter(|s| !s.trim().is_empty()) {
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            SqlmendError::Config(format!("invalid value for {}: {:?} ({})", key, raw, e))
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AgentConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, AgentConfig::default());
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.sql_policy(), SqlPolicy::ReadOnly);
    }

    #[test]
    fn test_overrides_from_env() {
        let config = AgentConfig::from_lookup(lookup_from(&[
            ("SQLMEND_MAX_ITERATIONS", "5"),
            ("SQLMEND_EXECUTION_TIMEOUT_SECS", "7"),
            ("SQLMEND_ALLOW_WRITES", "yes"),
            ("SQLMEND_GENERATION_TIMEOUT_SECS", ""),
        ]))
        .unwrap();

        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.execution_timeout, Duration::from_secs(7));
        assert_eq!(config.generation_timeout, Duration::from_secs(120));
        assert_eq!(config.sql_policy(), SqlPolicy::AllowWrites);
    }

    #[test]
    fn test_invalid_value_fails() {
        let result = AgentConfig::from_lookup(lookup_from(&[("SQLMEND_MAX_ITERATIONS", "three")]));
        assert!(matches!(result, Err(SqlmendError::Config(_))));
    }
}
