//! CLI utilities for binaries
//!
//! Handles settings path resolution and command line arguments.

use anyhow::{bail, Result};
use std::path::PathBuf;

/// Type of configuration to load
#[derive(Debug, Clone)]
pub enum ConfigType {
    /// Client settings (config/pubsub.yaml)
    Client,
    /// Path given with `--config`
    Custom(String),
}

impl ConfigType {
    /// Get the default path for this config type
    pub fn default_path(&self) -> &str {
        match self {
            ConfigType::Client => "config/pubsub.yaml",
            ConfigType::Custom(path) => path,
        }
    }

    /// Environment variable that overrides the default path
    ///
    /// A path given on the command line is never overridden.
    pub fn env_var_name(&self) -> Option<&str> {
        match self {
            ConfigType::Client => Some("PUBSUB_CONFIG_PATH"),
            ConfigType::Custom(_) => None,
        }
    }
}

/// Load configuration path from environment or use default
///
/// # Examples
/// ```
/// use pubsub_client::bin_common::{load_config_from_env, ConfigType};
///
/// let path = load_config_from_env(ConfigType::Client);
/// ```
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    config_type
        .env_var_name()
        .and_then(|name| std::env::var(name).ok())
        .unwrap_or_else(|| config_type.default_path().to_string())
        .into()
}

/// Pull `--config <path>` out of the arguments
///
/// Returns the config to load and the remaining arguments in order.
pub fn take_config_arg(args: Vec<String>) -> Result<(ConfigType, Vec<String>)> {
    let mut config = ConfigType::Client;
    let mut rest = Vec::with_capacity(args.len());
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        if arg == "--config" {
            match args.next() {
                Some(path) => config = ConfigType::Custom(path),
                None => bail!("--config needs a path"),
            }
        } else {
            rest.push(arg);
        }
    }
    Ok((config, rest))
}

/// Parse command line arguments for a binary
///
/// Returns a vector of arguments (excluding the program name)
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}
