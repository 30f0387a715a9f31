//! File-based client settings
//!
//! ```yaml
//! url: "ws://localhost:8000/connection/websocket"
//! request_timeout_secs: 10
//! credentials:
//!   user: "42"
//!   timestamp: "1700000000"
//!   token: "signed-token"
//! channels:
//!   - news
//! ```

use crate::core::builder::states::{HasCredentials, HasUrl};
use crate::core::builder::PubSubClientBuilder;
use crate::core::message::Credentials;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Connection settings loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    pub url: String,
    pub credentials: Credentials,
    /// Channels to subscribe to once connected
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl ClientSettings {
    /// Load settings from a YAML file
    ///
    /// Environment overrides are applied before validation.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml_content = std::fs::read_to_string(path)?;
        let mut settings: ClientSettings = serde_yaml::from_str(&yaml_content)?;

        settings.apply_env_overrides();
        settings.validate()?;

        info!("Loaded client settings from {}", path.display());
        Ok(settings)
    }

    /// Override fields from `PUBSUB_URL`, `PUBSUB_USER`, `PUBSUB_TOKEN` and `PUBSUB_TIMESTAMP`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("PUBSUB_URL") {
            debug!("Overriding url from PUBSUB_URL");
            self.url = url;
        }
        if let Ok(user) = std::env::var("PUBSUB_USER") {
            self.credentials.user = user;
        }
        if let Ok(token) = std::env::var("PUBSUB_TOKEN") {
            self.credentials.token = token;
        }
        if let Ok(timestamp) = std::env::var("PUBSUB_TIMESTAMP") {
            self.credentials.timestamp = timestamp;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::ValidationError("url must not be empty".to_string()));
        }

        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ConfigError::ValidationError(format!(
                "url must start with ws:// or wss://, got '{}'",
                self.url
            )));
        }

        if self.credentials.user.is_empty() {
            return Err(ConfigError::ValidationError(
                "credentials.user must not be empty".to_string(),
            ));
        }

        if self.channels.iter().any(String::is_empty) {
            return Err(ConfigError::ValidationError(
                "channel names must not be empty".to_string(),
            ));
        }

        if self.request_timeout_secs == Some(0) {
            return Err(ConfigError::ValidationError(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Start a builder with the url, credentials and timeout filled in
    pub fn into_builder(self) -> PubSubClientBuilder<HasUrl, HasCredentials> {
        let timeout = self.request_timeout();
        let builder = PubSubClientBuilder::new()
            .url(self.url)
            .credentials(self.credentials);

        match timeout {
            Some(timeout) => builder.request_timeout(timeout),
            None => builder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
url: "ws://localhost:8000/connection/websocket"
request_timeout_secs: 5
credentials:
  user: "42"
  timestamp: "1700000000"
  token: "abc"
channels:
  - news
  - chat
"#;

    fn settings() -> ClientSettings {
        serde_yaml::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn test_parse_settings() {
        let settings = settings();
        assert_eq!(settings.url, "ws://localhost:8000/connection/websocket");
        assert_eq!(settings.credentials.user, "42");
        assert_eq!(settings.credentials.info, "");
        assert_eq!(settings.channels, vec!["news", "chat"]);
        assert_eq!(settings.request_timeout(), Some(Duration::from_secs(5)));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_channels_and_timeout_are_optional() {
        let settings: ClientSettings = serde_yaml::from_str(
            "url: wss://example.com\ncredentials:\n  user: u\n  timestamp: '1'\n  token: t\n",
        )
        .unwrap();
        assert!(settings.channels.is_empty());
        assert_eq!(settings.request_timeout(), None);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut bad_scheme = settings();
        bad_scheme.url = "http://localhost".to_string();
        assert!(matches!(bad_scheme.validate(), Err(ConfigError::ValidationError(_))));

        let mut no_user = settings();
        no_user.credentials.user.clear();
        assert!(no_user.validate().is_err());

        let mut empty_channel = settings();
        empty_channel.channels.push(String::new());
        assert!(empty_channel.validate().is_err());

        let mut zero_timeout = settings();
        zero_timeout.request_timeout_secs = Some(0);
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let settings = ClientSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.channels.len(), 2);
    }

    #[test]
    fn test_missing_file() {
        let result = ClientSettings::from_file("/nonexistent/pubsub.yaml");
        assert!(matches!(result, Err(ConfigError::FileError(_))));
    }

    #[test]
    fn test_invalid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"url: [unterminated").unwrap();

        let result = ClientSettings::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::YamlError(_))));
    }

    #[test]
    fn test_into_builder() {
        let config = settings().into_builder().build_config().unwrap();
        assert_eq!(config.url(), "ws://localhost:8000/connection/websocket");
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(5)));
    }
}
