//! Configuration management for Lambda functions.

use std::env;

use crate::{Error, Result};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database host
    pub db_host: String,
    /// Database name
    pub db_name: String,
    /// ARN of the secret containing database credentials
    pub db_secret_arn: String,
    /// AWS region
    pub aws_region: String,
    /// Bedrock agent id (assistant only)
    pub agent_id: Option<String>,
    /// Bedrock agent alias id (assistant only)
    pub agent_alias_id: Option<String>,
}

/// Bedrock agent coordinates.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub agent_id: String,
    pub agent_alias_id: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| Error::Config(format!("{} not set", key)))
        };

        Ok(Self {
            db_host: required("DB_HOST")?,
            db_name: lookup("DB_NAME").unwrap_or_else(|| "kinlog".to_string()),
            db_secret_arn: required("DB_SECRET_ARN")?,
            aws_region: lookup("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            agent_id: lookup("BEDROCK_AGENT_ID"),
            agent_alias_id: lookup("BEDROCK_AGENT_ALIAS_ID"),
        })
    }

    /// Bedrock agent settings, required by the assistant Lambda.
    pub fn agent(&self) -> Result<AgentConfig> {
        match (&self.agent_id, &self.agent_alias_id) {
            (Some(id), Some(alias)) => Ok(AgentConfig {
                agent_id: id.clone(),
                agent_alias_id: alias.clone(),
            }),
            _ => Err(Error::Config(
                "BEDROCK_AGENT_ID and BEDROCK_AGENT_ALIAS_ID must be set".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_lookup(lookup(&[
            ("DB_HOST", "db.internal"),
            ("DB_SECRET_ARN", "arn:aws:secretsmanager:us-east-1:1:secret:db"),
        ]))
        .unwrap();

        assert_eq!(config.db_name, "kinlog");
        assert_eq!(config.aws_region, "us-east-1");
        assert!(config.agent().is_err());
    }

    #[test]
    fn test_missing_host_is_config_error() {
        let err = Config::from_lookup(lookup(&[("DB_SECRET_ARN", "arn")])).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("DB_HOST")));
    }

    #[test]
    fn test_agent_config() {
        let config = Config::from_lookup(lookup(&[
            ("DB_HOST", "h"),
            ("DB_SECRET_ARN", "arn"),
            ("BEDROCK_AGENT_ID", "AGENT123"),
            ("BEDROCK_AGENT_ALIAS_ID", "ALIAS456"),
        ]))
        .unwrap();

        let agent = config.agent().unwrap();
        assert_eq!(agent.agent_id, "AGENT123");
        assert_eq!(agent.agent_alias_id, "ALIAS456");
    }
}
