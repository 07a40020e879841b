//! Exec-backed CNI plugin client
//!
//! Plugins are binaries resolved over the plugin directories. Each call passes
//! its parameters through `CNI_*` environment variables and the network
//! configuration on stdin; ADD results come back as JSON on stdout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::cni::conf::{self, NetworkConfigList};
use crate::cni::{PluginClient, PluginClientFactory, PluginResult};
use crate::config::AppConfig;
use crate::error::CniError;

/// Linux errno for "text file busy"
const ETXTBSY: i32 = 26;
const SPAWN_ATTEMPTS: u32 = 5;
const SPAWN_RETRY_DELAY: Duration = Duration::from_millis(50);

/// CNI operation selected through `CNI_COMMAND`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CniCommand {
    Add,
    Del,
}

impl CniCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            CniCommand::Add => "ADD",
            CniCommand::Del => "DEL",
        }
    }
}

/// Error document a failing plugin writes to stdout
#[derive(Debug, Deserialize)]
struct PluginErrorDoc {
    code: u32,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    details: Option<String>,
}

/// Factory that reads the configuration directory on every call
#[derive(Debug, Clone)]
pub struct CniPluginFactory {
    conf_dir: PathBuf,
    plugin_dirs: Vec<PathBuf>,
}

impl CniPluginFactory {
    pub fn new(conf_dir: impl Into<PathBuf>, plugin_dirs: Vec<PathBuf>) -> Self {
        Self {
            conf_dir: conf_dir.into(),
            plugin_dirs,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.cni_conf_dir,
            config.cni_plugin_dirs.iter().map(PathBuf::from).collect(),
        )
    }

    fn search_path(&self) -> String {
        self.plugin_dirs
            .iter()
            .map(|dir| dir.display().to_string())
            .collect::<Vec<_>>()
            .join(":")
    }

    fn find_plugin(&self, plugin_type: &str) -> Result<PathBuf, CniError> {
        self.plugin_dirs
            .iter()
            .map(|dir| dir.join(plugin_type))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| CniError::PluginNotFound {
                plugin: plugin_type.to_string(),
                search_path: self.search_path(),
            })
    }
}

impl PluginClientFactory for CniPluginFactory {
    type Client = CniPluginClient;

    fn new_client(&self) -> Result<Self::Client, CniError> {
        let network = conf::load_from_dir(&self.conf_dir)?;
        let binaries = network
            .plugins
            .iter()
            .map(|plugin| self.find_plugin(&plugin.plugin_type))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CniPluginClient {
            network,
            binaries,
            cni_path: self.search_path(),
        })
    }
}

/// Client bound to one resolved plugin chain
#[derive(Debug, Clone)]
pub struct CniPluginClient {
    network: NetworkConfigList,
    binaries: Vec<PathBuf>,
    cni_path: String,
}

/// Per-call parameters shared by every plugin in the chain
struct Invocation<'a> {
    command: CniCommand,
    id: &'a str,
    netns_path: &'a str,
    if_name: &'a str,
}

impl CniPluginClient {
    pub fn network(&self) -> &NetworkConfigList {
        &self.network
    }

    pub fn plugin_binaries(&self) -> &[PathBuf] {
        &self.binaries
    }

    async fn invoke(
        &self,
        index: usize,
        call: &Invocation<'_>,
        prev_result: Option<&Value>,
    ) -> Result<Vec<u8>, CniError> {
        let plugin = &self.network.plugins[index];
        let binary = &self.binaries[index];
        let payload = plugin
            .stdin_payload(&self.network.name, &self.network.cni_version, prev_result)
            .map_err(|e| CniError::InvalidResult {
                plugin: plugin.plugin_type.clone(),
                reason: format!("cannot encode configuration: {}", e),
            })?;

        debug!(
            plugin = %plugin.plugin_type,
            command = call.command.as_str(),
            id = call.id,
            netns = call.netns_path,
            ifname = call.if_name,
            "Invoking CNI plugin"
        );

        let mut child = spawn_plugin(binary, &plugin.plugin_type, |cmd| {
            cmd.env("CNI_COMMAND", call.command.as_str())
                .env("CNI_CONTAINERID", call.id)
                .env("CNI_NETNS", call.netns_path)
                .env("CNI_IFNAME", call.if_name)
                .env("CNI_PATH", &self.cni_path);
        })
        .await?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(&payload).await {
                Ok(()) => {}
                // Plugin exited before reading; its status tells the story
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => {
                    return Err(CniError::Exec {
                        plugin: plugin.plugin_type.clone(),
                        source: e,
                    })
                }
            }
        }

        let output = child.wait_with_output().await.map_err(|e| CniError::Exec {
            plugin: plugin.plugin_type.clone(),
            source: e,
        })?;

        if !output.status.success() {
            return Err(plugin_failure(&plugin.plugin_type, &output));
        }

        Ok(output.stdout)
    }
}

impl PluginClient for CniPluginClient {
    async fn add_network(
        &self,
        id: &str,
        netns_path: &str,
        if_name: &str,
    ) -> Result<PluginResult, CniError> {
        let call = Invocation {
            command: CniCommand::Add,
            id,
            netns_path,
            if_name,
        };
        let mut prev_result: Option<Value> = None;

        for index in 0..self.network.plugins.len() {
            let plugin_type = &self.network.plugins[index].plugin_type;
            let stdout = self.invoke(index, &call, prev_result.as_ref()).await?;
            let value: Value = serde_json::from_slice(&stdout).map_err(|e| CniError::InvalidResult {
                plugin: plugin_type.clone(),
                reason: e.to_string(),
            })?;
            prev_result = Some(value);
        }

        let last_plugin = self
            .network
            .plugins
            .last()
            .map(|p| p.plugin_type.clone())
            .unwrap_or_default();
        let value = prev_result.ok_or_else(|| CniError::InvalidResult {
            plugin: last_plugin.clone(),
            reason: "plugin chain produced no result".to_string(),
        })?;

        serde_json::from_value(value).map_err(|e| CniError::InvalidResult {
            plugin: last_plugin,
            reason: e.to_string(),
        })
    }

    async fn remove_network(&self, id: &str, netns_path: &str, if_name: &str) -> Result<(), CniError> {
        let call = Invocation {
            command: CniCommand::Del,
            id,
            netns_path,
            if_name,
        };

        for index in (0..self.network.plugins.len()).rev() {
            self.invoke(index, &call, None).await?;
        }

        Ok(())
    }
}

/// Spawn a plugin, retrying while the binary is still open for writing
async fn spawn_plugin<F>(binary: &Path, plugin: &str, configure: F) -> Result<Child, CniError>
where
    F: Fn(&mut Command),
{
    let mut attempt = 1;

    loop {
        let mut cmd = Command::new(binary);
        configure(&mut cmd);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match cmd.spawn() {
            Ok(child) => return Ok(child),
            Err(e) if e.raw_os_error() == Some(ETXTBSY) && attempt < SPAWN_ATTEMPTS => {
                warn!(plugin, attempt, "Plugin binary busy, retrying in {:?}", SPAWN_RETRY_DELAY);
                attempt += 1;
                sleep(SPAWN_RETRY_DELAY).await;
            }
            Err(e) => {
                return Err(CniError::Exec {
                    plugin: plugin.to_string(),
                    source: e,
                })
            }
        }
    }
}

fn plugin_failure(plugin: &str, output: &std::process::Output) -> CniError {
    if let Ok(doc) = serde_json::from_slice::<PluginErrorDoc>(&output.stdout) {
        return CniError::Plugin {
            plugin: plugin.to_string(),
            code: doc.code,
            msg: doc.msg,
            details: doc.details,
        };
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    CniError::Plugin {
        plugin: plugin.to_string(),
        code: output.status.code().map(|c| c as u32).unwrap_or(0),
        msg: if stderr.is_empty() {
            format!("exited with {}", output.status)
        } else {
            stderr
        },
        details: None,
    }
}
