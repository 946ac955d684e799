//! Tool configuration
//!
//! Loaded from a JSON file. Every section is optional and falls back to the
//! defaults below, so an empty object is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable overriding `elasticsearch.url`
pub const ES_URL_ENV: &str = "SIEMAPP_ES_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,
    #[serde(default)]
    pub usecases: UsecasesConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Backend connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    #[serde(default = "default_es_url")]
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Usecase definitions and write-back index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsecasesConfig {
    /// Directory holding `<usecase>.json` definitions
    #[serde(default = "default_usecases_path")]
    pub path: PathBuf,
    /// Write-back index name
    #[serde(default = "default_index")]
    pub index: String,
    /// Past alerts fetched per history request; the whole window is paged
    #[serde(default = "default_history_page_size")]
    pub history_page_size: usize,
}

/// Syslog collector receiving wire lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_host")]
    pub host: String,
    #[serde(default = "default_notify_port")]
    pub port: u16,
}

fn default_es_url() -> String {
    "http://127.0.0.1:9200".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_usecases_path() -> PathBuf {
    PathBuf::from("usecases.d")
}

fn default_index() -> String {
    "xlm_alerting".to_string()
}

fn default_history_page_size() -> usize {
    crate::store::DEFAULT_HISTORY_PAGE_SIZE
}

fn default_notify_host() -> String {
    "127.0.0.1".to_string()
}

fn default_notify_port() -> u16 {
    514
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: default_es_url(),
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for UsecasesConfig {
    fn default() -> Self {
        Self {
            path: default_usecases_path(),
            index: default_index(),
            history_page_size: default_history_page_size(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            host: default_notify_host(),
            port: default_notify_port(),
        }
    }
}

impl Config {
    /// Read and parse a configuration file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        tracing::info!("Loading configuration from {}", path.display());

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::from_json(&content)?;
        config.apply_env();
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.usecases.history_page_size == 0 {
            return Err(ConfigError::Invalid(
                "usecases.history_page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Override values from environment variables
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ES_URL_ENV) {
            if !url.trim().is_empty() {
                self.elasticsearch.url = url.trim().to_string();
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read configuration: {0}")]
    Read(String),

    #[error("Invalid configuration: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.elasticsearch.url, "http://127.0.0.1:9200");
        assert_eq!(config.elasticsearch.timeout_secs, 30);
        assert_eq!(config.usecases.path, PathBuf::from("usecases.d"));
        assert_eq!(config.usecases.index, "xlm_alerting");
        assert_eq!(config.usecases.history_page_size, 1_000);
        assert_eq!(config.notify.host, "127.0.0.1");
        assert_eq!(config.notify.port, 514);
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_json(
            r#"{
                "elasticsearch": { "url": "https://es.local:9200", "username": "svc" },
                "notify": { "port": 1514 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.elasticsearch.url, "https://es.local:9200");
        assert_eq!(config.elasticsearch.username.as_deref(), Some("svc"));
        assert!(config.elasticsearch.password.is_none());
        assert_eq!(config.notify.host, "127.0.0.1");
        assert_eq!(config.notify.port, 1514);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "usecases": {{ "path": "/etc/uc", "index": "alerts" }} }}"#).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.usecases.path, PathBuf::from("/etc/uc"));
        assert_eq!(config.usecases.index, "alerts");
    }

    #[test]
    fn test_example_config_parses() {
        let content = include_str!("../config.example.json");
        let config = Config::from_json(content).unwrap();
        assert_eq!(config.usecases.index, "xlm_alerting");
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            Config::load("/nonexistent/siemapp.json"),
            Err(ConfigError::Read(_))
        ));
        assert!(matches!(Config::from_json("{ not json"), Err(ConfigError::Parse(_))));
        assert!(matches!(
            Config::from_json(r#"{ "notify": { "port": "syslog" } }"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_zero_history_page_size_rejected() {
        let result = Config::from_json(r#"{ "usecases": { "history_page_size": 0 } }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let config = Config::from_json(r#"{ "usecases": { "history_page_size": 50 } }"#).unwrap();
        assert_eq!(config.usecases.history_page_size, 50);
    }
}
