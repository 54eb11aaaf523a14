//! Configuration for the evaluation orchestrator.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Connection settings for the external agent service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the agent platform (e.g., "https://agents.example.run")
    pub base_url: String,

    /// Agent receiving evaluation submissions (the dataset loader).
    pub submission_agent: String,

    /// Agent answering result queries.
    pub query_agent: String,

    /// Agent serving the dataset catalog.
    pub catalog_agent: String,

    /// Bearer token; `None` means unauthenticated access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

impl ServiceConfig {
    fn agent_url(&self, agent: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{}/{}", base, agent.trim_start_matches('/'))
    }

    /// URL of the submission endpoint.
    pub fn submission_url(&self) -> String {
        self.agent_url(&self.submission_agent)
    }

    /// URL of the query endpoint.
    pub fn query_url(&self) -> String {
        self.agent_url(&self.query_agent)
    }

    /// URL of the dataset catalog endpoint.
    pub fn catalog_url(&self) -> String {
        self.agent_url(&self.catalog_agent)
    }

    /// The configured token, treating an empty string as absent.
    pub fn bearer_token(&self) -> Option<&str> {
        self.api_token.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Defaults applied to new evaluation configurations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationDefaults {
    pub model_name: String,
    pub judge_model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub similarity_threshold: u8,
    pub prompt_template: String,
}

impl Default for EvaluationDefaults {
    fn default() -> Self {
        Self {
            model_name: "claude-sonnet-4-20250514".to_string(),
            judge_model: "gpt-4o-mini".to_string(),
            max_tokens: 100,
            temperature: 0.1,
            similarity_threshold: 80,
            prompt_template:
                "You are an expert assistant. Answer the following question: {{query}}".to_string(),
        }
    }
}

/// Timing policy for the status polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Grace period before the first status query.
    pub initial_delay_secs: u64,
    /// Delay between two status queries.
    pub interval_secs: u64,
    /// Number of status queries before giving up.
    pub max_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: 5,
            interval_secs: 5,
            max_attempts: 40,
        }
    }
}

impl PollingConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Where local state lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the local evaluation registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// The configured directory, or the platform data directory.
    pub fn resolve_data_dir(&self) -> Option<PathBuf> {
        self.data_dir.clone().or_else(|| {
            directories::ProjectDirs::from("", "", "eval-orchestrator")
                .map(|dirs| dirs.data_dir().to_path_buf())
        })
    }
}

/// Changes to saved settings; `None` leaves a value unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsUpdate {
    pub base_url: Option<String>,
    pub submission_agent: Option<String>,
    pub query_agent: Option<String>,
    pub catalog_agent: Option<String>,
    /// An empty token removes the credential.
    pub api_token: Option<String>,
    pub model_name: Option<String>,
    pub judge_model: Option<String>,
    pub similarity_threshold: Option<u8>,
    pub data_dir: Option<PathBuf>,
}

/// Full application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub defaults: EvaluationDefaults,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    service: Option<ServiceFileSection>,
    defaults: Option<DefaultsFileSection>,
    polling: Option<PollingFileSection>,
    storage: Option<StorageConfig>,
}

#[derive(Debug, Deserialize)]
struct ServiceFileSection {
    base_url: Option<String>,
    submission_agent: Option<String>,
    query_agent: Option<String>,
    catalog_agent: Option<String>,
    api_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DefaultsFileSection {
    model_name: Option<String>,
    judge_model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
    similarity_threshold: Option<u8>,
    prompt_template: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PollingFileSection {
    initial_delay_secs: Option<u64>,
    interval_secs: Option<u64>,
    max_attempts: Option<u32>,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (EVAL_API_BASE_URL, EVAL_API_TOKEN, ...)
    /// 2. Config file (~/.config/eval-orchestrator/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_env(|key| env::var(key).ok());

        Ok(config)
    }

    /// Override values from environment-style lookups.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base_url) = lookup("EVAL_API_BASE_URL") {
            self.service.base_url = base_url;
        }
        if let Some(agent) = lookup("EVAL_SUBMISSION_AGENT") {
            self.service.submission_agent = agent;
        }
        if let Some(agent) = lookup("EVAL_QUERY_AGENT") {
            self.service.query_agent = agent;
        }
        if let Some(agent) = lookup("EVAL_CATALOG_AGENT") {
            self.service.catalog_agent = agent;
        }
        if let Some(token) = lookup("EVAL_API_TOKEN") {
            self.service.api_token = Some(token).filter(|t| !t.is_empty());
        }
        if let Some(dir) = lookup("EVAL_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| OrchestratorError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse a YAML document, filling unspecified values with defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| OrchestratorError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(service) = file_config.service {
            if let Some(base_url) = service.base_url {
                config.service.base_url = base_url;
            }
            if let Some(agent) = service.submission_agent {
                config.service.submission_agent = agent;
            }
            if let Some(agent) = service.query_agent {
                config.service.query_agent = agent;
            }
            if let Some(agent) = service.catalog_agent {
                config.service.catalog_agent = agent;
            }
            config.service.api_token = service.api_token.filter(|t| !t.is_empty());
        }

        if let Some(defaults) = file_config.defaults {
            let target = &mut config.defaults;
            if let Some(model) = defaults.model_name {
                target.model_name = model;
            }
            if let Some(judge) = defaults.judge_model {
                target.judge_model = judge;
            }
            if let Some(max_tokens) = defaults.max_tokens {
                target.max_tokens = max_tokens;
            }
            if let Some(temperature) = defaults.temperature {
                target.temperature = temperature;
            }
            if let Some(threshold) = defaults.similarity_threshold {
                target.similarity_threshold = threshold;
            }
            if let Some(template) = defaults.prompt_template {
                target.prompt_template = template;
            }
        }

        if let Some(polling) = file_config.polling {
            if let Some(delay) = polling.initial_delay_secs {
                config.polling.initial_delay_secs = delay;
            }
            if let Some(interval) = polling.interval_secs {
                config.polling.interval_secs = interval;
            }
            if let Some(attempts) = polling.max_attempts {
                config.polling.max_attempts = attempts;
            }
        }

        if let Some(storage) = file_config.storage {
            config.storage = storage;
        }

        Ok(config)
    }

    /// Apply user-edited settings. Nothing changes if a value is out of range.
    pub fn apply_update(&mut self, update: SettingsUpdate) -> Result<()> {
        if update.similarity_threshold.is_some_and(|t| t > 100) {
            return Err(OrchestratorError::Config(
                "Similarity threshold must be between 0 and 100".to_string(),
            ));
        }

        if let Some(base_url) = update.base_url {
            self.service.base_url = base_url.trim().to_string();
        }
        if let Some(agent) = update.submission_agent {
            self.service.submission_agent = agent.trim().to_string();
        }
        if let Some(agent) = update.query_agent {
            self.service.query_agent = agent.trim().to_string();
        }
        if let Some(agent) = update.catalog_agent {
            self.service.catalog_agent = agent.trim().to_string();
        }
        if let Some(token) = update.api_token {
            self.service.api_token = Some(token).filter(|t| !t.trim().is_empty());
        }
        if let Some(model) = update.model_name {
            self.defaults.model_name = model;
        }
        if let Some(judge) = update.judge_model {
            self.defaults.judge_model = judge;
        }
        if let Some(threshold) = update.similarity_threshold {
            self.defaults.similarity_threshold = threshold;
        }
        if let Some(dir) = update.data_dir {
            self.storage.data_dir = Some(dir);
        }
        Ok(())
    }

    /// Write the configuration as YAML, creating parent directories.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| OrchestratorError::io(parent, e))?;
            }
        }

        let content = serde_yaml::to_string(self)
            .map_err(|e| OrchestratorError::Serialization(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| OrchestratorError::io(path, e))
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "eval-orchestrator")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that required configuration is present.
    pub fn validate(&self) -> Result<()> {
        if self.service.base_url.is_empty() {
            return Err(OrchestratorError::Config(
                "Service base URL is required. Set EVAL_API_BASE_URL environment variable or add to config file.".to_string()
            ));
        }

        let agents = [
            ("submission", &self.service.submission_agent, "EVAL_SUBMISSION_AGENT"),
            ("query", &self.service.query_agent, "EVAL_QUERY_AGENT"),
            ("catalog", &self.service.catalog_agent, "EVAL_CATALOG_AGENT"),
        ];
        for (role, agent, var) in agents {
            if agent.is_empty() {
                return Err(OrchestratorError::Config(format!(
                    "The {} agent id is required. Set {} environment variable or add to config file.",
                    role, var
                )));
            }
        }

        if self.polling.max_attempts == 0 {
            return Err(OrchestratorError::Config(
                "polling.max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Create a config from explicit service values (useful for testing).
    pub fn with_service(
        base_url: impl Into<String>,
        submission_agent: impl Into<String>,
        query_agent: impl Into<String>,
        catalog_agent: impl Into<String>,
    ) -> Self {
        Self {
            service: ServiceConfig {
                base_url: base_url.into(),
                submission_agent: submission_agent.into(),
                query_agent: query_agent.into(),
                catalog_agent: catalog_agent.into(),
                api_token: None,
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.service.base_url.is_empty());
        assert!(config.service.api_token.is_none());
        assert_eq!(config.defaults.max_tokens, 100);
        assert_eq!(config.defaults.similarity_threshold, 80);
        assert_eq!(config.polling.max_attempts, 40);
        assert_eq!(config.polling.interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_fails_without_required_fields() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let mut config = Config::with_service("https://agents.example.run", "a", "b", "c");
        assert!(config.validate().is_ok());
        config.service.query_agent.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_urls() {
        let config = Config::with_service("https://agents.example.run/", "loader", "results", "datasets");
        assert_eq!(config.service.submission_url(), "https://agents.example.run/loader");
        assert_eq!(config.service.query_url(), "https://agents.example.run/results");
        assert_eq!(config.service.catalog_url(), "https://agents.example.run/datasets");
    }

    #[test]
    fn test_blank_token_is_unauthenticated() {
        let mut service = ServiceConfig {
            api_token: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(service.bearer_token(), None);
        service.api_token = Some("secret".to_string());
        assert_eq!(service.bearer_token(), Some("secret"));
    }

    #[test]
    fn test_yaml_overrides_defaults() {
        let yaml = r#"
service:
  base_url: https://agents.example.run
  submission_agent: loader
  query_agent: results
  catalog_agent: datasets
defaults:
  judge_model: claude-3-5-haiku-latest
  similarity_threshold: 70
polling:
  max_attempts: 10
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.service.query_agent, "results");
        assert_eq!(config.defaults.judge_model, "claude-3-5-haiku-latest");
        assert_eq!(config.defaults.similarity_threshold, 70);
        assert_eq!(config.defaults.max_tokens, 100);
        assert_eq!(config.polling.max_attempts, 10);
        assert_eq!(config.polling.interval_secs, 5);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("EVAL_API_BASE_URL", "https://other.example.run"),
            ("EVAL_API_TOKEN", "tok"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::with_service("https://agents.example.run", "a", "b", "c");
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.service.base_url, "https://other.example.run");
        assert_eq!(config.service.api_token.as_deref(), Some("tok"));
        assert_eq!(config.service.submission_agent, "a");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = Config::with_service("https://agents.example.run", "a", "b", "c");
        config.service.api_token = Some("tok".to_string());
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_settings_update_is_saved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = Config::with_service("https://old.example.run", "a", "b", "c");
        config.service.api_token = Some("old".to_string());
        config
            .apply_update(SettingsUpdate {
                base_url: Some(" https://new.example.run ".to_string()),
                api_token: Some(String::new()),
                judge_model: Some("gpt-4o".to_string()),
                similarity_threshold: Some(70),
                ..Default::default()
            })
            .unwrap();
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.service.base_url, "https://new.example.run");
        assert_eq!(loaded.service.submission_agent, "a");
        assert_eq!(loaded.service.api_token, None);
        assert_eq!(loaded.defaults.judge_model, "gpt-4o");
        assert_eq!(loaded.defaults.similarity_threshold, 70);
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn test_settings_update_rejects_threshold_out_of_range() {
        let mut config = Config::with_service("https://agents.example.run", "a", "b", "c");
        let before = config.clone();

        let err = config
            .apply_update(SettingsUpdate {
                base_url: Some("https://other.example.run".to_string()),
                similarity_threshold: Some(101),
                ..Default::default()
            })
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::Config(_)));
        assert_eq!(config, before);
    }
}
