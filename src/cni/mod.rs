//! CNI plugin integration module
//!
//! Defines the result document returned by plugins and the client seam the
//! orchestrator drives. The exec-backed implementation lives in [`exec`].

use std::future::Future;
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::error::CniError;

pub mod conf;
pub mod exec;

/// Result of attaching one interface, as reported by the plugin chain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginResult {
    #[serde(rename = "cniVersion", default)]
    pub cni_version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<Interface>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<IpConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    #[serde(default, skip_serializing_if = "Dns::is_empty")]
    pub dns: Dns,
}

impl PluginResult {
    /// True when the plugin reported nothing beyond its version
    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty() && self.ips.is_empty() && self.routes.is_empty() && self.dns.is_empty()
    }
}

/// Interface created or configured by a plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<String>,
}

/// Address assigned to an interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpConfig {
    /// Only present in 0.3.x results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Index into [`PluginResult::interfaces`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<usize>,
    pub address: IpNetwork,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<IpAddr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub dst: IpNetwork,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gw: Option<IpAddr>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dns {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Dns {
    pub fn is_empty(&self) -> bool {
        self.nameservers.is_empty() && self.domain.is_none() && self.search.is_empty() && self.options.is_empty()
    }
}

/// Plugin client trait
///
/// Calls are keyed by the endpoint identifier, the namespace path and the
/// interface name inside that namespace.
pub trait PluginClient {
    fn add_network(
        &self,
        id: &str,
        netns_path: &str,
        if_name: &str,
    ) -> impl Future<Output = Result<PluginResult, CniError>> + Send;
    fn remove_network(
        &self,
        id: &str,
        netns_path: &str,
        if_name: &str,
    ) -> impl Future<Output = Result<(), CniError>> + Send;
}

/// Produces a fresh [`PluginClient`] for every attach or detach sequence
pub trait PluginClientFactory {
    type Client: PluginClient;

    fn new_client(&self) -> Result<Self::Client, CniError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plugin_result() {
        let raw = r#"{
            "cniVersion": "0.4.0",
            "interfaces": [
                {"name": "cni0", "mac": "0a:58:0a:58:00:01"},
                {"name": "eth0", "mac": "0a:58:0a:58:00:05", "sandbox": "/var/run/netns/sb"}
            ],
            "ips": [
                {"version": "4", "interface": 1, "address": "10.88.0.5/16", "gateway": "10.88.0.1"}
            ],
            "routes": [{"dst": "0.0.0.0/0"}],
            "dns": {"nameservers": ["10.88.0.1"]}
        }"#;

        let result: PluginResult = serde_json::from_str(raw).unwrap();

        assert_eq!(result.cni_version, "0.4.0");
        assert_eq!(result.interfaces.len(), 2);
        assert_eq!(result.interfaces[1].sandbox.as_deref(), Some("/var/run/netns/sb"));
        assert_eq!(result.ips[0].interface, Some(1));
        assert_eq!(result.ips[0].address, "10.88.0.5/16".parse::<IpNetwork>().unwrap());
        assert_eq!(result.ips[0].gateway, Some("10.88.0.1".parse().unwrap()));
        assert_eq!(result.routes[0].gw, None);
        assert_eq!(result.dns.nameservers, vec!["10.88.0.1"]);
        assert!(!result.is_empty());
    }

    #[test]
    fn test_minimal_result_is_empty() {
        let result: PluginResult = serde_json::from_str(r#"{"cniVersion": "1.0.0"}"#).unwrap();
        assert!(result.is_empty());
        assert!(result.dns.is_empty());
    }

    #[test]
    fn test_rejects_malformed_address() {
        let raw = r#"{"cniVersion": "1.0.0", "ips": [{"address": "not-an-address"}]}"#;
        assert!(serde_json::from_str::<PluginResult>(raw).is_err());
    }
}
