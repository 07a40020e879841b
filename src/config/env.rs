//! Environment variable configuration handling

use crate::config::{AppConfig, LogFormat};
use crate::error::ConfigError;
use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "SANDBOX_CNI_";

/// Standard CNI variable listing plugin directories
const CNI_PATH_VAR: &str = "CNI_PATH";

/// Apply environment variable configuration over base configuration
pub fn apply_env_config(mut base_config: AppConfig) -> Result<AppConfig, ConfigError> {
    if let Ok(dir) = env::var(format!("{}CONF_DIR", ENV_PREFIX)) {
        base_config.cni_conf_dir = dir;
    }

    // The prefixed variable wins over the conventional CNI_PATH
    if let Ok(dirs) = env::var(format!("{}PLUGIN_DIRS", ENV_PREFIX)) {
        base_config.cni_plugin_dirs = parse_path_list(&dirs);
    } else if let Ok(dirs) = env::var(CNI_PATH_VAR) {
        base_config.cni_plugin_dirs = parse_path_list(&dirs);
    }

    if let Ok(dir) = env::var(format!("{}NETNS_DIR", ENV_PREFIX)) {
        base_config.netns_dir = dir;
    }

    if let Ok(max) = env::var(format!("{}MAX_INTERFACES", ENV_PREFIX)) {
        base_config.max_interfaces = max.trim().parse::<usize>().map_err(|_| {
            ConfigError::InvalidFormat(format!("Invalid max interfaces: '{}'", max))
        })?;
    }

    if let Ok(level) = env::var(format!("{}LOG_LEVEL", ENV_PREFIX)) {
        base_config.log_level = level;
    }

    if let Ok(format) = env::var(format!("{}LOG_FORMAT", ENV_PREFIX)) {
        base_config.log_format = LogFormat::parse(&format)?;
    }

    Ok(base_config)
}

/// Split a colon separated directory list, dropping empty entries
/// Examples:
/// - "/opt/cni/bin" -> ["/opt/cni/bin"]
/// - "/usr/lib/cni::/opt/cni/bin:" -> ["/usr/lib/cni", "/opt/cni/bin"]
pub fn parse_path_list(value: &str) -> Vec<String> {
    value
        .split(':')
        .map(str::trim)
        .filter(|dir| !dir.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    const VARS: [&str; 7] = [
        "SANDBOX_CNI_CONF_DIR",
        "SANDBOX_CNI_PLUGIN_DIRS",
        "SANDBOX_CNI_NETNS_DIR",
        "SANDBOX_CNI_MAX_INTERFACES",
        "SANDBOX_CNI_LOG_LEVEL",
        "SANDBOX_CNI_LOG_FORMAT",
        "CNI_PATH",
    ];

    fn cleanup_env_vars() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    // Process environment is shared, so every scenario runs in one test
    #[test]
    fn test_apply_env_config() {
        cleanup_env_vars();

        let base_config = AppConfig::default();
        let config = apply_env_config(base_config.clone()).unwrap();
        assert_eq!(config.cni_conf_dir, base_config.cni_conf_dir);
        assert_eq!(config.cni_plugin_dirs, base_config.cni_plugin_dirs);
        assert_eq!(config.netns_dir, base_config.netns_dir);
        assert_eq!(config.max_interfaces, base_config.max_interfaces);
        assert_eq!(config.log_level, base_config.log_level);

        env::set_var("CNI_PATH", "/usr/libexec/cni:/opt/cni/bin");
        let config = apply_env_config(AppConfig::default()).unwrap();
        assert_eq!(config.cni_plugin_dirs, vec!["/usr/libexec/cni", "/opt/cni/bin"]);

        env::set_var("SANDBOX_CNI_CONF_DIR", "/custom/net.d");
        env::set_var("SANDBOX_CNI_PLUGIN_DIRS", "/custom/bin");
        env::set_var("SANDBOX_CNI_NETNS_DIR", "/run/custom-netns");
        env::set_var("SANDBOX_CNI_MAX_INTERFACES", "8");
        env::set_var("SANDBOX_CNI_LOG_LEVEL", "debug");
        env::set_var("SANDBOX_CNI_LOG_FORMAT", "compact");
        let config = apply_env_config(AppConfig::default()).unwrap();
        assert_eq!(config.cni_conf_dir, "/custom/net.d");
        assert_eq!(config.cni_plugin_dirs, vec!["/custom/bin"]);
        assert_eq!(config.netns_dir, "/run/custom-netns");
        assert_eq!(config.max_interfaces, 8);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Compact);

        env::set_var("SANDBOX_CNI_MAX_INTERFACES", "many");
        let result = apply_env_config(AppConfig::default());
        assert!(matches!(result, Err(ConfigError::InvalidFormat(_))));

        cleanup_env_vars();
    }

    #[test]
    fn test_parse_path_list() {
        assert_eq!(parse_path_list("/opt/cni/bin"), vec!["/opt/cni/bin"]);
        assert_eq!(
            parse_path_list("/usr/lib/cni::/opt/cni/bin:"),
            vec!["/usr/lib/cni", "/opt/cni/bin"]
        );
        assert!(parse_path_list("  ").is_empty());
    }
}
