//! Configuration management for the research agent.
//!
//! Configuration is read from environment variables. A `.env` file in the
//! working directory is loaded first; variables already present in the
//! process environment win.
//!
//! - `MAIN_LLM_BASE_URL` - Required. Base URL of an OpenAI-compatible API (e.g. `https://api.openai.com/v1`).
//! - `MAIN_LLM_API_KEY` - Required. API key for the model endpoint.
//! - `MAIN_LLM_MODEL_NAME` - Required. Model identifier.
//! - `MAIN_LLM_TIMEOUT_SECS` - Optional. Request timeout. Defaults to `120`.
//! - `MAIN_LLM_TEMPERATURE` - Optional. Sampling temperature. Unset by default.
//! - `TAVILY_API_KEY` - Required. Key for the Tavily search/extract API.
//! - `TAVILY_BASE_URL` - Optional. Defaults to `https://api.tavily.com`.
//! - `USE_LOCAL_CRAWLER` - Optional. Fetch pages directly instead of via Tavily extract. Defaults to `false`.
//! - `SANDBOX_DIR` - Optional. Directory the agent may read and write. Defaults to `./sandbox`.
//! - `MAX_ITERATIONS` - Optional. Maximum model calls per user turn. Defaults to `50`.
//! - `HOST` - Optional. Browser UI host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Browser UI port. Defaults to `3000`.

use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_TAVILY_BASE_URL: &str = "https://api.tavily.com";
pub const DEFAULT_SANDBOX_DIR: &str = "./sandbox";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Model endpoint configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible API
    pub base_url: String,

    /// Bearer token for the API
    pub api_key: String,

    /// Model identifier sent with every request
    pub model: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Optional sampling temperature
    pub temperature: Option<f32>,
}

/// Where `crawl_url` gets page content from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlerBackend {
    /// Tavily's hosted extract endpoint
    Tavily,
    /// Direct HTTP fetch with local HTML-to-text conversion
    Local,
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Model endpoint
    pub llm: LlmConfig,

    /// Tavily API key
    pub tavily_api_key: String,

    /// Tavily API base URL
    pub tavily_base_url: String,

    /// Backend used by the `crawl_url` tool
    pub crawler: CrawlerBackend,

    /// Sandbox directory for file tools
    pub sandbox_dir: PathBuf,

    /// Browser UI host
    pub host: String,

    /// Browser UI port
    pub port: u16,

    /// Maximum model calls per user turn
    pub max_iterations: usize,
}

impl Config {
    /// Load configuration from the environment (and `.env`, if present).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if any of the model variables or
    /// `TAVILY_API_KEY` is unset or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!("Ignoring unreadable .env file: {}", e),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let llm = LlmConfig {
            base_url: required("MAIN_LLM_BASE_URL")?,
            api_key: required("MAIN_LLM_API_KEY")?,
            model: required("MAIN_LLM_MODEL_NAME")?,
            timeout_secs: parse_var(&lookup, "MAIN_LLM_TIMEOUT_SECS")?.unwrap_or(120),
            temperature: parse_var(&lookup, "MAIN_LLM_TEMPERATURE")?,
        };

        let tavily_api_key = required("TAVILY_API_KEY")?;
        let tavily_base_url =
            lookup("TAVILY_BASE_URL").unwrap_or_else(|| DEFAULT_TAVILY_BASE_URL.to_string());

        let use_local_crawler = lookup("USE_LOCAL_CRAWLER")
            .map(|v| {
                parse_bool(&v).map_err(|e| ConfigError::InvalidValue("USE_LOCAL_CRAWLER".to_string(), e))
            })
            .transpose()?
            .unwrap_or(false);
        let crawler = if use_local_crawler {
            CrawlerBackend::Local
        } else {
            CrawlerBackend::Tavily
        };

        let sandbox_dir = lookup("SANDBOX_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SANDBOX_DIR));

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_var(&lookup, "PORT")?.unwrap_or(3000);

        let max_iterations: usize = parse_var(&lookup, "MAX_ITERATIONS")?.unwrap_or(50);
        if max_iterations == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_ITERATIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            llm,
            tavily_api_key,
            tavily_base_url,
            crawler,
            sandbox_dir,
            host,
            port,
            max_iterations,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(llm: LlmConfig, tavily_api_key: String, sandbox_dir: PathBuf) -> Self {
        Self {
            llm,
            tavily_api_key,
            tavily_base_url: DEFAULT_TAVILY_BASE_URL.to_string(),
            crawler: CrawlerBackend::Tavily,
            sandbox_dir,
            host: "127.0.0.1".to_string(),
            port: 3000,
            max_iterations: 50,
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("{}", e)))
        })
        .transpose()
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected boolean-like value, got: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("MAIN_LLM_BASE_URL", "http://localhost:8000/v1"),
        ("MAIN_LLM_API_KEY", "sk-test"),
        ("MAIN_LLM_MODEL_NAME", "gpt-test"),
        ("TAVILY_API_KEY", "tvly-test"),
    ];

    #[test]
    fn defaults_apply_when_only_required_vars_set() {
        let config = Config::from_lookup(env(REQUIRED)).expect("config");
        assert_eq!(config.llm.model, "gpt-test");
        assert_eq!(config.llm.timeout_secs, 120);
        assert_eq!(config.llm.temperature, None);
        assert_eq!(config.tavily_base_url, DEFAULT_TAVILY_BASE_URL);
        assert_eq!(config.crawler, CrawlerBackend::Tavily);
        assert_eq!(config.sandbox_dir, PathBuf::from("./sandbox"));
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_iterations, 50);
    }

    #[test]
    fn missing_model_variable_is_reported_by_name() {
        let pairs: Vec<_> = REQUIRED
            .iter()
            .copied()
            .filter(|(k, _)| *k != "MAIN_LLM_MODEL_NAME")
            .collect();
        match Config::from_lookup(env(&pairs)) {
            Err(ConfigError::MissingEnvVar(name)) => assert_eq!(name, "MAIN_LLM_MODEL_NAME"),
            other => panic!("expected missing var error, got {:?}", other),
        }
    }

    #[test]
    fn empty_tavily_key_counts_as_missing() {
        let mut pairs = REQUIRED.to_vec();
        pairs.retain(|(k, _)| *k != "TAVILY_API_KEY");
        pairs.push(("TAVILY_API_KEY", "  "));
        assert!(matches!(
            Config::from_lookup(env(&pairs)),
            Err(ConfigError::MissingEnvVar(name)) if name == "TAVILY_API_KEY"
        ));
    }

    #[test]
    fn local_crawler_flag_and_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("USE_LOCAL_CRAWLER", "Yes"),
            ("SANDBOX_DIR", "/tmp/box"),
            ("PORT", "8080"),
            ("MAIN_LLM_TEMPERATURE", "0.2"),
        ]);
        let config = Config::from_lookup(env(&pairs)).expect("config");
        assert_eq!(config.crawler, CrawlerBackend::Local);
        assert_eq!(config.sandbox_dir, PathBuf::from("/tmp/box"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.llm.temperature, Some(0.2));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("USE_LOCAL_CRAWLER", "maybe"));
        assert!(matches!(
            Config::from_lookup(env(&pairs)),
            Err(ConfigError::InvalidValue(name, _)) if name == "USE_LOCAL_CRAWLER"
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MAX_ITERATIONS", "0"));
        assert!(matches!(
            Config::from_lookup(env(&pairs)),
            Err(ConfigError::InvalidValue(name, _)) if name == "MAX_ITERATIONS"
        ));
    }
}
