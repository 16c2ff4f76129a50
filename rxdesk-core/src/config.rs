//! Configuration management

use crate::error::{ErrorContext, RxdeskError, RxdeskResult};
use crate::logging::LoggingConfig;
use crate::validation_error;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variable overriding `api.base_url`
pub const API_URL_ENV: &str = "RXDESK_API_URL";

/// Top-level client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RxdeskConfig {
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// REST backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL every request path is joined onto
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string
    pub user_agent: String,
    /// Additional headers sent with every request
    pub headers: HashMap<String, String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout_seconds: 30,
            user_agent: format!("rxdesk/{}", env!("CARGO_PKG_VERSION")),
            headers: HashMap::new(),
        }
    }
}

/// Token exchange endpoints and the login entry point
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub login_path: String,
    pub refresh_path: String,
    /// Route navigated to when the session is lost
    pub login_route: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_path: "/api/login/".to_string(),
            refresh_path: "/api/token/refresh/".to_string(),
            login_route: "/login".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON file on disk
    File,
    /// Process memory only
    Memory,
    /// No persistence at all
    #[serde(rename = "none")]
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Session file location; defaults to `<data_dir>/rxdesk/session.json`
    pub session_file: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            session_file: None,
        }
    }
}

impl StorageConfig {
    /// Resolve the session file path, expanding a leading `~`
    pub fn session_file_path(&self) -> RxdeskResult<PathBuf> {
        if let Some(path) = &self.session_file {
            return expand_home(path);
        }

        let base = dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
            .ok_or_else(|| RxdeskError::Config {
                message: "Could not determine a data directory for the session file".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("session_file_path")
                    .with_suggestion("Set storage.session_file explicitly"),
            })?;

        Ok(base.join("rxdesk").join("session.json"))
    }
}

fn expand_home(path: &str) -> RxdeskResult<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir().ok_or_else(|| RxdeskError::Config {
                message: format!("Cannot expand '~' in {}", path),
                source: None,
                context: ErrorContext::new("config").with_operation("expand_home"),
            })?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

impl RxdeskConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> RxdeskResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RxdeskError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: RxdeskConfig = toml::from_str(&content).map_err(|e| RxdeskError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> RxdeskResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| RxdeskError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| RxdeskError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Apply environment overrides on top of the file values
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                tracing::debug!(base_url = %url, "Overriding api.base_url from environment");
                self.api.base_url = url;
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> RxdeskResult<()> {
        let parsed = url::Url::parse(&self.api.base_url).map_err(|e| RxdeskError::Config {
            message: format!("Invalid api.base_url '{}': {}", self.api.base_url, e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("validate")
                .with_suggestion("Use an absolute URL such as https://pharmacy.example.com"),
        })?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(validation_error!(
                format!("Unsupported scheme '{}'", parsed.scheme()),
                "api.base_url",
                "config"
            ));
        }

        if self.api.timeout_seconds == 0 {
            return Err(validation_error!(
                "Request timeout must be greater than 0",
                "api.timeout_seconds",
                "config"
            ));
        }

        for (field, value) in [
            ("auth.login_path", &self.auth.login_path),
            ("auth.refresh_path", &self.auth.refresh_path),
            ("auth.login_route", &self.auth.login_route),
        ] {
            if !value.starts_with('/') {
                return Err(validation_error!(
                    format!("'{}' must start with '/'", value),
                    field,
                    "config"
                ));
            }
        }

        Ok(())
    }
}

/// Default configuration file location: `<config_dir>/rxdesk/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|d| d.join(".config")))
        .map(|d| d.join("rxdesk").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RxdeskConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.auth.login_route, "/login");
        assert_eq!(config.storage.backend, StorageBackend::File);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = RxdeskConfig::default();
        config.api.base_url = "https://pharmacy.example.com".to_string();
        config.storage.backend = StorageBackend::Memory;
        config.save_to_file(&path).unwrap();

        let loaded = RxdeskConfig::from_file(&path).unwrap();
        assert_eq!(loaded.api.base_url, "https://pharmacy.example.com");
        assert_eq!(loaded.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: RxdeskConfig =
            toml::from_str("[api]\nbase_url = \"https://api.example.com\"\n").unwrap();
        assert_eq!(config.api.timeout_seconds, 30);
        assert_eq!(config.auth.refresh_path, "/api/token/refresh/");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = RxdeskConfig::default();
        config.api.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = RxdeskConfig::default();
        config.api.timeout_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = RxdeskConfig::default();
        config.auth.refresh_path = "api/token/refresh/".to_string();
        match config.validate() {
            Err(RxdeskError::Validation { field, .. }) => {
                assert_eq!(field.as_deref(), Some("auth.refresh_path"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_explicit_session_file_wins() {
        let storage = StorageConfig {
            backend: StorageBackend::File,
            session_file: Some("/var/lib/rxdesk/session.json".to_string()),
        };
        assert_eq!(
            storage.session_file_path().unwrap(),
            PathBuf::from("/var/lib/rxdesk/session.json")
        );
    }
}
