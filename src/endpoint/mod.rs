//! Network endpoint abstraction
//!
//! An endpoint is one logical attachment point of a sandbox. Only variants
//! tagged [`EndpointCapability::PluginAttachable`] are handed to the CNI
//! plugin; everything else passes through the attach and detach loops untouched.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{AppConfig, MAX_ENDPOINT_INDEX_SPACE};
use crate::error::NetworkError;

pub mod physical;
pub mod virtual_endpoint;

pub use physical::PhysicalEndpoint;
pub use virtual_endpoint::{NetPair, NetworkInterface, VirtualEndpoint};

/// Whether an endpoint takes part in plugin attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointCapability {
    PluginAttachable,
    PassThrough,
}

/// Endpoint variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Endpoint {
    /// veth/TAP pair bridged into the VM
    Virtual(VirtualEndpoint),
    /// Host device passed through to the VM
    Physical(PhysicalEndpoint),
}

impl Endpoint {
    pub fn id(&self) -> &str {
        match self {
            Endpoint::Virtual(v) => v.id(),
            Endpoint::Physical(p) => &p.id,
        }
    }

    /// Interface name inside the network namespace
    pub fn if_name(&self) -> &str {
        match self {
            Endpoint::Virtual(v) => v.if_name(),
            Endpoint::Physical(p) => &p.iface_name,
        }
    }

    pub fn capability(&self) -> EndpointCapability {
        match self {
            Endpoint::Virtual(_) => EndpointCapability::PluginAttachable,
            Endpoint::Physical(_) => EndpointCapability::PassThrough,
        }
    }

    /// The virtual endpoint, when the capability tag allows plugin attach
    pub fn as_plugin_attachable(&self) -> Option<&VirtualEndpoint> {
        match (self.capability(), self) {
            (EndpointCapability::PluginAttachable, Endpoint::Virtual(v)) => Some(v),
            _ => None,
        }
    }

    pub fn as_plugin_attachable_mut(&mut self) -> Option<&mut VirtualEndpoint> {
        match (self.capability(), self) {
            (EndpointCapability::PluginAttachable, Endpoint::Virtual(v)) => Some(v),
            _ => None,
        }
    }
}

/// Endpoint factory trait
pub trait EndpointFactory {
    fn create_endpoints(&self, count: usize) -> Result<Vec<Endpoint>, NetworkError>;
}

/// Allocates plugin-attachable veth endpoints, one per requested interface
#[derive(Debug, Clone)]
pub struct VethEndpointFactory {
    max_interfaces: usize,
}

impl VethEndpointFactory {
    pub fn new(max_interfaces: usize) -> Self {
        Self {
            max_interfaces: max_interfaces.min(MAX_ENDPOINT_INDEX_SPACE),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.max_interfaces)
    }
}

impl EndpointFactory for VethEndpointFactory {
    fn create_endpoints(&self, count: usize) -> Result<Vec<Endpoint>, NetworkError> {
        if count > self.max_interfaces {
            return Err(NetworkError::EndpointCreationFailed(format!(
                "requested {} interfaces, at most {} can be allocated",
                count, self.max_interfaces
            )));
        }

        let endpoints: Vec<Endpoint> = (0..count)
            .map(|index| Endpoint::Virtual(VirtualEndpoint::new(index)))
            .collect();

        debug!(count = endpoints.len(), "Allocated virtual endpoints");
        Ok(endpoints)
    }
}
