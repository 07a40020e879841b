//! Host device passed straight through to the VM

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalEndpoint {
    pub id: String,
    pub iface_name: String,
    /// PCI address, e.g. `0000:03:00.0`
    pub bdf: String,
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub hard_addr: String,
}

impl PhysicalEndpoint {
    pub fn new(iface_name: &str, bdf: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            iface_name: iface_name.to_string(),
            bdf: bdf.to_string(),
            driver: String::new(),
            hard_addr: String::new(),
        }
    }
}
