//! Command-line argument parsing

use crate::config::AppConfig;
use crate::error::ConfigError;
use clap::{Parser, Subcommand};

/// Command-line arguments structure
#[derive(Parser, Debug)]
#[command(name = "sandbox-cni")]
#[command(about = "CNI-driven network attachment for VM-backed container sandboxes")]
#[command(version)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, help = "Path to TOML configuration file")]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, help = "Set the logging level")]
    pub log_level: Option<String>,

    /// CNI network configuration directory
    #[arg(long, help = "Directory holding CNI network configuration files")]
    pub cni_conf_dir: Option<String>,

    /// CNI plugin directories
    #[arg(
        long = "cni-plugin-dir",
        help = "Directory searched for CNI plugin binaries (repeatable)"
    )]
    pub cni_plugin_dirs: Vec<String>,

    /// Network namespace persistence directory
    #[arg(long, help = "Directory where created network namespaces are mounted")]
    pub netns_dir: Option<String>,

    /// Validate configuration and exit
    #[arg(
        long,
        help = "Validate configuration and exit without touching the network"
    )]
    pub validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    pub print_default_config: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Network lifecycle operations
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create endpoints, attach them through the CNI plugin and bridge them
    Add {
        /// Sandbox identifier
        #[arg(long)]
        sandbox_id: String,

        /// Number of interfaces to create
        #[arg(long, default_value_t = 1)]
        interfaces: usize,

        /// Join an existing network namespace instead of creating one
        #[arg(long)]
        netns: Option<String>,

        /// Write the resulting namespace record here instead of stdout
        #[arg(long)]
        state: Option<String>,
    },

    /// Tear down a namespace previously produced by `add`
    Remove {
        /// Sandbox identifier
        #[arg(long)]
        sandbox_id: String,

        /// Namespace record written by `add`
        #[arg(long)]
        state: String,
    },

    /// Report which network configuration and plugins would be used
    Check,
}

impl CliArgs {
    /// Apply CLI arguments over base configuration
    pub fn apply_to_config(&self, mut base_config: AppConfig) -> Result<AppConfig, ConfigError> {
        if let Some(ref dir) = self.cni_conf_dir {
            base_config.cni_conf_dir = dir.clone();
        }

        if !self.cni_plugin_dirs.is_empty() {
            base_config.cni_plugin_dirs = self.cni_plugin_dirs.clone();
        }

        if let Some(ref dir) = self.netns_dir {
            base_config.netns_dir = dir.clone();
        }

        if let Some(ref level) = self.log_level {
            base_config.log_level = level.clone();
        }

        Ok(base_config)
    }
}

/// Print default configuration in TOML format
pub fn print_default_config() {
    let default_config = AppConfig::default();

    println!("# Sandbox CNI Configuration");
    println!("# This is the default configuration with all available options");
    println!();
    println!("[cni]");
    println!("# Directory holding .conflist, .conf or .json network configurations");
    println!("conf_dir = \"{}\"", default_config.cni_conf_dir);
    println!("# Directories searched for plugin binaries, in order");
    let dirs: Vec<String> = default_config
        .cni_plugin_dirs
        .iter()
        .map(|dir| format!("\"{}\"", dir))
        .collect();
    println!("plugin_dirs = [{}]", dirs.join(", "));
    println!();
    println!("[netns]");
    println!("# Directory where created network namespaces are mounted");
    println!("dir = \"{}\"", default_config.netns_dir);
    println!();
    println!("[endpoints]");
    println!("# Maximum number of interfaces allocated per namespace");
    println!("max_interfaces = {}", default_config.max_interfaces);
    println!();
    println!("[logging]");
    println!("# Log level: trace, debug, info, warn, error");
    println!("level = \"{}\"", default_config.log_level);
    println!("# Log format: full or compact");
    println!("format = \"{}\"", default_config.log_format.as_str());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_args_parsing() {
        let args = CliArgs::try_parse_from([
            "sandbox-cni",
            "--config",
            "/etc/sandbox-cni.toml",
            "--log-level",
            "debug",
            "--cni-conf-dir",
            "/tmp/net.d",
            "--cni-plugin-dir",
            "/usr/lib/cni",
            "--cni-plugin-dir",
            "/opt/cni/bin",
            "--netns-dir",
            "/run/netns",
            "--validate-config",
        ])
        .unwrap();

        assert_eq!(args.config, Some("/etc/sandbox-cni.toml".to_string()));
        assert_eq!(args.log_level, Some("debug".to_string()));
        assert_eq!(args.cni_conf_dir, Some("/tmp/net.d".to_string()));
        assert_eq!(args.cni_plugin_dirs, vec!["/usr/lib/cni", "/opt/cni/bin"]);
        assert_eq!(args.netns_dir, Some("/run/netns".to_string()));
        assert!(args.validate_config);
        assert!(!args.print_default_config);
        assert_eq!(args.command, None);
    }

    #[test]
    fn test_cli_add_subcommand() {
        let args = CliArgs::try_parse_from([
            "sandbox-cni",
            "add",
            "--sandbox-id",
            "sb-1",
            "--interfaces",
            "2",
            "--state",
            "/tmp/sb-1.json",
        ])
        .unwrap();

        assert_eq!(
            args.command,
            Some(Command::Add {
                sandbox_id: "sb-1".to_string(),
                interfaces: 2,
                netns: None,
                state: Some("/tmp/sb-1.json".to_string()),
            })
        );
    }

    #[test]
    fn test_cli_remove_requires_state() {
        let result = CliArgs::try_parse_from(["sandbox-cni", "remove", "--sandbox-id", "sb-1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_cli_to_config() {
        let args = CliArgs::try_parse_from([
            "sandbox-cni",
            "--log-level",
            "trace",
            "--cni-conf-dir",
            "/test/net.d",
            "--cni-plugin-dir",
            "/test/bin",
            "--netns-dir",
            "/test/netns",
        ])
        .unwrap();

        let config = args.apply_to_config(AppConfig::default()).unwrap();

        assert_eq!(config.log_level, "trace");
        assert_eq!(config.cni_conf_dir, "/test/net.d");
        assert_eq!(config.cni_plugin_dirs, vec!["/test/bin"]);
        assert_eq!(config.netns_dir, "/test/netns");
    }

    #[test]
    fn test_apply_cli_to_config_no_overrides() {
        let args = CliArgs::try_parse_from(["sandbox-cni", "check"]).unwrap();

        let original_config = AppConfig::default();
        let config = args.apply_to_config(original_config.clone()).unwrap();

        assert_eq!(config.log_level, original_config.log_level);
        assert_eq!(config.cni_conf_dir, original_config.cni_conf_dir);
        assert_eq!(config.cni_plugin_dirs, original_config.cni_plugin_dirs);
        assert_eq!(config.netns_dir, original_config.netns_dir);
        assert_eq!(args.command, Some(Command::Check));
    }
}
