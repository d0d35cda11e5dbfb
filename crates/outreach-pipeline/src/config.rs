//! Runtime configuration from environment variables.

use outreach_tools::delivery::DEFAULT_ALLOWED_SENDER;
use outreach_tools::SendGridDelivery;
use outreach_types::{OutreachError, Result};

pub const DEFAULT_MAX_RESULTS_PER_QUERY: usize = 5;
pub const DEFAULT_FROM_NAME: &str = "NOFA BC";

#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Check robots policy before enriching a URL.
    pub robots_respect: bool,
    pub max_results_per_query: usize,
    /// Sender display name for drafts and sends.
    pub from_name: String,
    pub sendgrid_api_key: Option<String>,
    pub allowed_sender: String,
    /// SQLite URL; in-memory storage when absent.
    pub database_url: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            robots_respect: true,
            max_results_per_query: DEFAULT_MAX_RESULTS_PER_QUERY,
            from_name: DEFAULT_FROM_NAME.to_string(),
            sendgrid_api_key: None,
            allowed_sender: DEFAULT_ALLOWED_SENDER.to_string(),
            database_url: None,
        }
    }
}

impl RunnerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let robots_respect = match get("ROBOTS_RESPECT") {
            Some(v) => parse_bool("ROBOTS_RESPECT", &v)?,
            None => defaults.robots_respect,
        };
        let max_results_per_query = match get("MAX_RESULTS_PER_QUERY") {
            Some(v) => v.parse::<usize>().map_err(|_| {
                OutreachError::ValidationError(format!(
                    "MAX_RESULTS_PER_QUERY must be a non-negative integer, got '{v}'"
                ))
            })?,
            None => defaults.max_results_per_query,
        };

        Ok(Self {
            robots_respect,
            max_results_per_query,
            from_name: get("FROM_NAME").unwrap_or(defaults.from_name),
            sendgrid_api_key: get("SENDGRID_API_KEY"),
            allowed_sender: get("ALLOWED_SENDER").unwrap_or(defaults.allowed_sender),
            database_url: get("DATABASE_URL"),
        })
    }

    pub fn sendgrid(&self) -> SendGridDelivery {
        SendGridDelivery::new(self.sendgrid_api_key.clone(), self.allowed_sender.clone())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(OutreachError::ValidationError(format!(
            "{key} must be a boolean, got '{value}'"
        ))),
    }
}
