//! Network operations module
//!
//! Holds the namespace record the orchestrator builds and consumes, the
//! namespace lifecycle helpers and the provider-agnostic bridge plumbing.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;

pub mod common;
pub mod namespace;

pub use common::{BridgedNetwork, CommonNetwork, Hypervisor};
pub use namespace::{NamespaceLifecycle, NetnsLifecycle};

/// Request describing the interfaces a sandbox needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkConfig {
    pub num_interfaces: usize,
    /// Join this namespace instead of creating one
    pub netns_path: Option<String>,
}

/// Network namespace representation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkNamespace {
    pub netns_path: String,
    /// Created by us rather than handed in by the caller
    pub netns_created: bool,
    /// Creation order; teardown relies on it
    pub endpoints: Vec<Endpoint>,
}

/// The sandbox a namespace is being wired for
#[derive(Clone)]
pub struct Sandbox {
    pub id: String,
    hypervisor: Option<Arc<dyn Hypervisor>>,
}

impl Sandbox {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            hypervisor: None,
        }
    }

    /// Hand TAP devices to this hypervisor once bridged
    pub fn with_hypervisor(mut self, hypervisor: Arc<dyn Hypervisor>) -> Self {
        self.hypervisor = Some(hypervisor);
        self
    }

    pub fn hypervisor(&self) -> Option<&Arc<dyn Hypervisor>> {
        self.hypervisor.as_ref()
    }
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox")
            .field("id", &self.id)
            .field("hypervisor", &self.hypervisor.is_some())
            .finish()
    }
}
