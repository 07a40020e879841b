//! Configuration management module
//!
//! Handles loading configuration from multiple sources with proper precedence:
//! CLI arguments > environment variables > TOML files > defaults

use crate::error::ConfigError;

pub mod toml;
pub mod env;
pub mod cli;

use self::cli::CliArgs;

/// Upper bound imposed by the endpoint MAC scheme (two bytes of index).
pub const MAX_ENDPOINT_INDEX_SPACE: usize = 1 << 16;

/// Main configuration structure
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub cni_conf_dir: String,
    pub cni_plugin_dirs: Vec<String>,
    pub netns_dir: String,
    pub max_interfaces: usize,
    pub log_level: String,
    pub log_format: LogFormat,
}

/// Output format for the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Full,
    Compact,
}

impl LogFormat {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(LogFormat::Full),
            "compact" => Ok(LogFormat::Compact),
            other => Err(ConfigError::InvalidFormat(format!(
                "Unknown log format '{}'. Expected 'full' or 'compact'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Full => "full",
            LogFormat::Compact => "compact",
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cni_conf_dir: "/etc/cni/net.d".to_string(),
            cni_plugin_dirs: vec!["/opt/cni/bin".to_string()],
            netns_dir: "/var/run/netns".to_string(),
            max_interfaces: 16,
            log_level: "info".to_string(),
            log_format: LogFormat::Full,
        }
    }
}

impl AppConfig {
    /// Check cross-field constraints after all layers have been applied
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cni_conf_dir.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "cni_conf_dir".to_string(),
            });
        }

        if self.cni_plugin_dirs.iter().all(|dir| dir.trim().is_empty()) {
            return Err(ConfigError::MissingRequired {
                field: "cni_plugin_dirs".to_string(),
            });
        }

        if self.netns_dir.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "netns_dir".to_string(),
            });
        }

        if self.max_interfaces == 0 || self.max_interfaces > MAX_ENDPOINT_INDEX_SPACE {
            return Err(ConfigError::ValidationError(format!(
                "max_interfaces must be between 1 and {}, got {}",
                MAX_ENDPOINT_INDEX_SPACE, self.max_interfaces
            )));
        }

        Ok(())
    }
}

/// Build the effective configuration from every layer
pub fn load_configuration(cli: &CliArgs) -> Result<AppConfig, ConfigError> {
    let mut config = AppConfig::default();

    if let Some(ref path) = cli.config {
        let file = self::toml::load_toml_config(path)?;
        config = file.apply_to_config(config)?;
    }

    let config = env::apply_env_config(config)?;
    let config = cli.apply_to_config(config)?;
    config.validate()?;

    Ok(config)
}
