//! Centralized error types and handling

use thiserror::Error;

/// Main application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network operation error: {0}")]
    Network(#[from] NetworkError),

    #[error("CNI plugin error: {0}")]
    Cni(#[from] CniError),

    #[error("Network namespace error: {0}")]
    Namespace(#[from] NamespaceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("State file error: {0}")]
    State(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the add/remove orchestration.
///
/// Every variant keeps the failing step's cause as its source.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Network plugin provider unavailable: {0}")]
    ProviderUnavailable(#[source] CniError),

    #[error("Failed to attach network to {if_name} (endpoint {id}): {source}")]
    AttachFailed {
        id: String,
        if_name: String,
        #[source]
        source: CniError,
    },

    #[error("Failed to detach network from {if_name} (endpoint {id}): {source}")]
    DetachFailed {
        id: String,
        if_name: String,
        #[source]
        source: CniError,
    },

    #[error("Failed to create network endpoints: {0}")]
    EndpointCreationFailed(String),

    #[error("Common network setup failed: {0}")]
    CommonSetupFailed(#[source] PlumbingError),

    #[error("Common network teardown failed: {0}")]
    CommonTeardownFailed(#[source] PlumbingError),

    #[error("Failed to delete network namespace {path}: {source}")]
    NamespaceDeletionFailed {
        path: String,
        #[source]
        source: NamespaceError,
    },

    #[error("Network namespace operation failed: {0}")]
    Namespace(#[from] NamespaceError),
}

/// CNI plugin discovery, execution and protocol errors
#[derive(Debug, Error)]
pub enum CniError {
    #[error("No network configuration found in {dir}")]
    NoNetworkConfig { dir: String },

    #[error("Invalid network configuration {path}: {reason}")]
    InvalidNetworkConfig { path: String, reason: String },

    #[error("Plugin {plugin} not found in {search_path}")]
    PluginNotFound { plugin: String, search_path: String },

    #[error("Failed to execute plugin {plugin}: {source}")]
    Exec {
        plugin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Plugin {plugin} failed with code {code}: {msg}")]
    Plugin {
        plugin: String,
        code: u32,
        msg: String,
        details: Option<String>,
    },

    #[error("Plugin {plugin} returned an invalid result: {reason}")]
    InvalidResult { plugin: String, reason: String },
}

/// Network namespace lifecycle errors
#[derive(Debug, Error)]
pub enum NamespaceError {
    #[error("Failed to create network namespace {name}: {reason}")]
    CreateFailed { name: String, reason: String },

    #[error("Failed to access network namespace {path}: {reason}")]
    Access { path: String, reason: String },

    #[error("Failed to remove network namespace {path}: {reason}")]
    RemoveFailed { path: String, reason: String },

    #[error("Invalid network namespace path: {0}")]
    InvalidPath(String),
}

/// Bridge, TAP and hypervisor plumbing errors
#[derive(Debug, Error)]
pub enum PlumbingError {
    #[error("Link {name} not found")]
    LinkNotFound { name: String },

    #[error("Netlink operation on {link} failed: {reason}")]
    Netlink { link: String, reason: String },

    #[error("Failed to create TAP device {name}: {reason}")]
    Tap { name: String, reason: String },

    #[error("Invalid hardware address {0}")]
    InvalidHardwareAddr(String),

    #[error("Hypervisor rejected network device {name}: {reason}")]
    Hypervisor { name: String, reason: String },

    #[error(transparent)]
    Namespace(#[from] NamespaceError),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid configuration format: {0}")]
    InvalidFormat(String),

    #[error("Missing required configuration: {field}")]
    MissingRequired { field: String },

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
