//! CNI network configuration discovery and parsing

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::CniError;

/// Version injected when a configuration does not declare one
pub const DEFAULT_CNI_VERSION: &str = "0.4.0";

const CONF_EXTENSIONS: [&str; 3] = ["conflist", "conf", "json"];

/// Ordered plugin chain for one network
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfigList {
    pub name: String,
    pub cni_version: String,
    pub plugins: Vec<PluginConf>,
    pub source: PathBuf,
}

/// A single plugin entry of a chain
#[derive(Debug, Clone, PartialEq)]
pub struct PluginConf {
    pub plugin_type: String,
    raw: Map<String, Value>,
}

impl PluginConf {
    fn from_object(raw: Map<String, Value>, path: &Path) -> Result<Self, CniError> {
        let plugin_type = match raw.get("type").and_then(Value::as_str) {
            Some(t) if !t.trim().is_empty() => t.to_string(),
            _ => return Err(invalid(path, "plugin entry has no \"type\"")),
        };

        if plugin_type.contains('/') || plugin_type == "." || plugin_type == ".." {
            return Err(invalid(path, &format!("plugin type '{}' is not a bare name", plugin_type)));
        }

        Ok(Self { plugin_type, raw })
    }

    /// Render the document handed to the plugin on stdin
    pub fn stdin_payload(
        &self,
        name: &str,
        cni_version: &str,
        prev_result: Option<&Value>,
    ) -> Result<Vec<u8>, serde_json::Error> {
        let mut doc = self.raw.clone();
        doc.insert("name".to_string(), Value::String(name.to_string()));
        doc.insert("cniVersion".to_string(), Value::String(cni_version.to_string()));
        if let Some(prev) = prev_result {
            doc.insert("prevResult".to_string(), prev.clone());
        }
        serde_json::to_vec(&Value::Object(doc))
    }
}

/// Load the first usable network configuration from `dir`
///
/// Files ending in `.conflist`, `.conf` or `.json` are tried in name order.
pub fn load_from_dir(dir: &Path) -> Result<NetworkConfigList, CniError> {
    let files = conf_files(dir)?;
    let mut last_error = None;

    for file in files {
        match load_file(&file) {
            Ok(list) => {
                debug!(path = %file.display(), network = %list.name, "Loaded CNI network configuration");
                return Ok(list);
            }
            Err(e) => {
                warn!(path = %file.display(), "Skipping network configuration: {}", e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| CniError::NoNetworkConfig {
        dir: dir.display().to_string(),
    }))
}

/// Parse a single configuration file
pub fn load_file(path: &Path) -> Result<NetworkConfigList, CniError> {
    let content = fs::read_to_string(path).map_err(|e| invalid(path, &e.to_string()))?;
    parse(&content, path)
}

fn conf_files(dir: &Path) -> Result<Vec<PathBuf>, CniError> {
    let entries = fs::read_dir(dir).map_err(|_| CniError::NoNetworkConfig {
        dir: dir.display().to_string(),
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| CONF_EXTENSIONS.contains(&ext))
                .unwrap_or(false)
        })
        .collect();
    files.sort();

    Ok(files)
}

fn parse(content: &str, path: &Path) -> Result<NetworkConfigList, CniError> {
    let value: Value = serde_json::from_str(content).map_err(|e| invalid(path, &e.to_string()))?;
    let Value::Object(mut doc) = value else {
        return Err(invalid(path, "top level is not an object"));
    };

    let name = match doc.get("name").and_then(Value::as_str) {
        Some(n) if !n.trim().is_empty() => n.to_string(),
        _ => return Err(invalid(path, "missing network \"name\"")),
    };

    let cni_version = doc
        .get("cniVersion")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_CNI_VERSION)
        .to_string();

    // A bare plugin configuration is a chain of one
    let plugins = match doc.remove("plugins") {
        Some(Value::Array(entries)) => {
            if entries.is_empty() {
                return Err(invalid(path, "\"plugins\" is empty"));
            }
            entries
                .into_iter()
                .map(|entry| match entry {
                    Value::Object(obj) => PluginConf::from_object(obj, path),
                    _ => Err(invalid(path, "plugin entry is not an object")),
                })
                .collect::<Result<Vec<_>, _>>()?
        }
        Some(_) => return Err(invalid(path, "\"plugins\" is not an array")),
        None => vec![PluginConf::from_object(doc, path)?],
    };

    Ok(NetworkConfigList {
        name,
        cni_version,
        plugins,
        source: path.to_path_buf(),
    })
}

fn invalid(path: &Path, reason: &str) -> CniError {
    CniError::InvalidNetworkConfig {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}
