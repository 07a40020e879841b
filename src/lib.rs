//! Sandbox CNI - network attachment for VM-backed container sandboxes
//!
//! This library allocates endpoints for a sandbox network namespace, attaches
//! them through a CNI plugin chain, bridges them to TAP devices for the
//! hypervisor, and unwinds all of it again on teardown.

pub mod cni;
pub mod config;
pub mod endpoint;
pub mod network;
pub mod orchestrator;
pub mod error;

pub use error::{AppError, NetworkError};
pub use orchestrator::{CniNetwork, DefaultCniNetwork};
