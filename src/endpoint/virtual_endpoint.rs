//! veth/TAP backed endpoint

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cni::PluginResult;

/// One named interface with its hardware address
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub name: String,
    #[serde(default)]
    pub hard_addr: String,
}

/// Interfaces connecting the namespace side to the VM side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetPair {
    /// Identifier handed to the plugin as the container id
    pub id: String,
    /// Bridge joining the two interfaces
    pub name: String,
    /// Interface the plugin configures inside the namespace
    pub virt_iface: NetworkInterface,
    /// Interface handed to the hypervisor
    pub tap_iface: NetworkInterface,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualEndpoint {
    pub net_pair: NetPair,
    /// Last result reported by the plugin for this endpoint
    #[serde(default)]
    pub properties: Option<PluginResult>,
}

impl VirtualEndpoint {
    /// Endpoint for interface slot `index`, with a fresh identifier
    pub fn new(index: usize) -> Self {
        Self {
            net_pair: NetPair {
                id: Uuid::new_v4().to_string(),
                name: format!("br{}", index),
                virt_iface: NetworkInterface {
                    name: format!("eth{}", index),
                    hard_addr: generated_hard_addr(index),
                },
                tap_iface: NetworkInterface {
                    name: format!("tap{}", index),
                    hard_addr: String::new(),
                },
            },
            properties: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.net_pair.id
    }

    pub fn if_name(&self) -> &str {
        &self.net_pair.virt_iface.name
    }

    /// Replace whatever a previous attach stored
    pub fn set_properties(&mut self, result: PluginResult) {
        self.properties = Some(result);
    }
}

/// Locally administered MAC derived from the slot index
pub fn generated_hard_addr(index: usize) -> String {
    format!("02:00:ca:fe:{:02x}:{:02x}", (index >> 8) & 0xff, index & 0xff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_hard_addr() {
        assert_eq!(generated_hard_addr(0), "02:00:ca:fe:00:00");
        assert_eq!(generated_hard_addr(5), "02:00:ca:fe:00:05");
        assert_eq!(generated_hard_addr(0x1ff), "02:00:ca:fe:01:ff");
    }

    #[test]
    fn test_set_properties_overwrites() {
        let mut endpoint = VirtualEndpoint::new(1);
        endpoint.set_properties(PluginResult {
            cni_version: "0.3.1".to_string(),
            ..PluginResult::default()
        });
        endpoint.set_properties(PluginResult {
            cni_version: "1.0.0".to_string(),
            ..PluginResult::default()
        });

        assert_eq!(endpoint.properties.unwrap().cni_version, "1.0.0");
    }
}
