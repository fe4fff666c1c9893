//! Settings for the conversation core
//!
//! This module handles loading and validating settings from a YAML file with
//! environment variable overrides for deployment-specific values such as the
//! chat history directory and the remote document store endpoint.

use crate::error::{ParleyError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for the conversation core
///
/// Exactly one history backend is active process-wide: when `remote` is set
/// the remote document store is used, otherwise per-session files are
/// written under `chat_history_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Deployment environment name, used as a metrics dimension
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Directory for the file history backend
    #[serde(default = "default_chat_history_dir")]
    pub chat_history_dir: PathBuf,

    /// Remote document store settings; file backend is used when absent
    #[serde(default)]
    pub remote: Option<RemoteStoreSettings>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter, overridable with `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON-formatted log lines instead of human-readable ones
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Remote document store connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteStoreSettings {
    /// Base URL of the document store account
    pub endpoint: String,
    /// Access key sent with every request
    pub key: String,
    /// Database name
    #[serde(default = "default_database")]
    pub database: String,
    /// Container holding one document per conversation
    #[serde(default = "default_container")]
    pub container: String,
}

fn default_environment() -> String {
    "local".to_string()
}

fn default_chat_history_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("io", "parley", "parley") {
        return proj_dirs.data_dir().join("chat_history");
    }
    PathBuf::from("chat_history")
}

fn default_database() -> String {
    "chat_history".to_string()
}

fn default_container() -> String {
    "conversations".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            chat_history_dir: default_chat_history_dir(),
            remote: None,
            logging: LoggingSettings::default(),
        }
    }
}

impl Settings {
    /// Loads settings from a YAML file, then applies environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ParleyError::Config(format!(
                "failed to read {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let mut settings: Settings = serde_yaml::from_str(&raw)?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Builds settings from defaults plus environment overrides
    pub fn from_env() -> Self {
        let mut settings = Settings::default();
        settings.apply_env_overrides();
        settings
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(environment) = std::env::var("PARLEY_ENVIRONMENT") {
            self.environment = environment;
        }
        if let Ok(dir) = std::env::var("PARLEY_CHAT_HISTORY_DIR") {
            self.chat_history_dir = PathBuf::from(dir);
        }
        if let (Ok(endpoint), Ok(key)) = (
            std::env::var("PARLEY_STORE_ENDPOINT"),
            std::env::var("PARLEY_STORE_KEY"),
        ) {
            let base = self.remote.take();
            self.remote = Some(RemoteStoreSettings {
                endpoint,
                key,
                database: base
                    .as_ref()
                    .map(|r| r.database.clone())
                    .unwrap_or_else(default_database),
                container: base
                    .map(|r| r.container)
                    .unwrap_or_else(default_container),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.environment, "local");
        assert!(settings.remote.is_none());
    }

    #[test]
    fn test_parse_minimal_yaml() {
        let settings: Settings = serde_yaml::from_str("environment: dev\n").unwrap();
        assert_eq!(settings.environment, "dev");
        assert!(settings.remote.is_none());
    }

    #[test]
    fn test_parse_remote_yaml() {
        let yaml = r#"
environment: prod
chat_history_dir: /var/lib/parley/history
remote:
  endpoint: https://store.example.com
  key: secret
"#;
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        let remote = settings.remote.unwrap();
        assert_eq!(remote.endpoint, "https://store.example.com");
        assert_eq!(remote.database, "chat_history");
        assert_eq!(remote.container, "conversations");
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = Settings::load("/nonexistent/parley.yaml").unwrap_err();
        let err = err.downcast::<ParleyError>().unwrap();
        assert!(matches!(err, ParleyError::Config(_)));
    }
}
