//! TOML configuration file parsing

use serde::Deserialize;
use crate::config::{AppConfig, LogFormat};
use crate::error::ConfigError;

/// TOML configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct TomlConfig {
    pub cni: Option<CniConfig>,
    pub netns: Option<NetnsConfig>,
    pub endpoints: Option<EndpointsConfig>,
    pub logging: Option<LoggingConfig>,
}

/// CNI plugin locations
#[derive(Debug, Deserialize)]
pub struct CniConfig {
    pub conf_dir: Option<String>,
    pub plugin_dirs: Option<Vec<String>>,
}

/// Network namespace persistence
#[derive(Debug, Deserialize)]
pub struct NetnsConfig {
    pub dir: Option<String>,
}

/// Endpoint allocation limits
#[derive(Debug, Deserialize)]
pub struct EndpointsConfig {
    pub max_interfaces: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
}

impl TomlConfig {
    /// Apply file values over base configuration
    pub fn apply_to_config(self, mut base_config: AppConfig) -> Result<AppConfig, ConfigError> {
        if let Some(cni) = self.cni {
            if let Some(dir) = cni.conf_dir {
                base_config.cni_conf_dir = dir;
            }
            if let Some(dirs) = cni.plugin_dirs {
                base_config.cni_plugin_dirs = dirs;
            }
        }

        if let Some(dir) = self.netns.and_then(|netns| netns.dir) {
            base_config.netns_dir = dir;
        }

        if let Some(max) = self.endpoints.and_then(|endpoints| endpoints.max_interfaces) {
            base_config.max_interfaces = max;
        }

        if let Some(logging) = self.logging {
            if let Some(level) = logging.level {
                base_config.log_level = level;
            }
            if let Some(format) = logging.format {
                base_config.log_format = LogFormat::parse(&format)?;
            }
        }

        Ok(base_config)
    }
}

/// Load configuration from TOML file
pub fn load_toml_config(path: &str) -> Result<TomlConfig, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|_| ConfigError::FileNotFound { path: path.to_string() })?;

    toml::from_str(&content)
        .map_err(|e| ConfigError::InvalidFormat(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_toml_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[cni]
conf_dir = "/tmp/net.d"
plugin_dirs = ["/usr/lib/cni", "/opt/cni/bin"]

[netns]
dir = "/run/sandbox/netns"

[endpoints]
max_interfaces = 4

[logging]
level = "debug"
format = "compact"
"#
        )
        .unwrap();

        let parsed = load_toml_config(file.path().to_str().unwrap()).unwrap();
        let config = parsed.apply_to_config(AppConfig::default()).unwrap();

        assert_eq!(config.cni_conf_dir, "/tmp/net.d");
        assert_eq!(config.cni_plugin_dirs, vec!["/usr/lib/cni", "/opt/cni/bin"]);
        assert_eq!(config.netns_dir, "/run/sandbox/netns");
        assert_eq!(config.max_interfaces, 4);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Compact);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let parsed: TomlConfig = toml::from_str("[logging]\nlevel = \"warn\"\n").unwrap();
        let config = parsed.apply_to_config(AppConfig::default()).unwrap();

        assert_eq!(config.log_level, "warn");
        assert_eq!(config.cni_conf_dir, AppConfig::default().cni_conf_dir);
        assert_eq!(config.max_interfaces, AppConfig::default().max_interfaces);
    }

    #[test]
    fn test_missing_file() {
        let result = load_toml_config("/nonexistent/sandbox-cni.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cni\nconf_dir = ").unwrap();

        let result = load_toml_config(file.path().to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::InvalidFormat(_))));
    }
}
