//! CNI network orchestration
//!
//! `add` allocates endpoints, attaches each plugin-attachable one through a
//! fresh plugin client and then runs the common bridge setup. `remove` runs
//! the common teardown first, then detaches through a fresh client and finally
//! deletes the namespace. Neither path rolls back on failure.

use tracing::{debug, info};

use crate::cni::exec::CniPluginFactory;
use crate::cni::{PluginClient, PluginClientFactory};
use crate::config::AppConfig;
use crate::endpoint::{EndpointFactory, VethEndpointFactory};
use crate::error::{NamespaceError, NetworkError};
use crate::network::{
    BridgedNetwork, CommonNetwork, NamespaceLifecycle, NetnsLifecycle, NetworkConfig,
    NetworkNamespace, Sandbox,
};

/// Subsystem tag carried by every orchestrator log record
pub const SUBSYSTEM: &str = "cni";

/// Network implementation driven by a CNI plugin
#[derive(Debug, Clone)]
pub struct CniNetwork<P, F, C, N> {
    plugins: P,
    endpoints: F,
    common: C,
    namespaces: N,
}

/// Production wiring: exec plugins, veth endpoints, bridged TAPs, netns-rs
pub type DefaultCniNetwork = CniNetwork<
    CniPluginFactory,
    VethEndpointFactory,
    BridgedNetwork<NetnsLifecycle>,
    NetnsLifecycle,
>;

impl DefaultCniNetwork {
    pub fn from_config(config: &AppConfig) -> Self {
        let namespaces = NetnsLifecycle::from_config(config);
        CniNetwork::new(
            CniPluginFactory::from_config(config),
            VethEndpointFactory::from_config(config),
            BridgedNetwork::new(namespaces.clone()),
            namespaces,
        )
    }
}

impl<P, F, C, N> CniNetwork<P, F, C, N>
where
    P: PluginClientFactory,
    F: EndpointFactory,
    C: CommonNetwork,
    N: NamespaceLifecycle,
{
    pub fn new(plugins: P, endpoints: F, common: C, namespaces: N) -> Self {
        Self {
            plugins,
            endpoints,
            common,
            namespaces,
        }
    }

    pub fn plugins(&self) -> &P {
        &self.plugins
    }

    pub fn namespaces(&self) -> &N {
        &self.namespaces
    }

    /// Locate or create the namespace the interfaces will live in
    pub fn init(&self, config: &NetworkConfig) -> Result<(String, bool), NetworkError> {
        Ok(self.namespaces.init(config)?)
    }

    /// Run a callback inside the namespace at `netns_path`
    pub fn run<T, E, Cb>(&self, netns_path: &str, callback: Cb) -> Result<T, E>
    where
        Cb: FnOnce() -> Result<T, E>,
        E: From<NamespaceError>,
    {
        self.namespaces.run(netns_path, callback)
    }

    /// Create, attach and bridge `config.num_interfaces` endpoints
    pub async fn add(
        &self,
        sandbox: &Sandbox,
        config: &NetworkConfig,
        netns_path: &str,
        netns_created: bool,
    ) -> Result<NetworkNamespace, NetworkError> {
        let endpoints = self.endpoints.create_endpoints(config.num_interfaces)?;

        let mut netns = NetworkNamespace {
            netns_path: netns_path.to_string(),
            netns_created,
            endpoints,
        };

        self.add_virt_interfaces(&mut netns).await?;

        self.common
            .setup(sandbox, &mut netns)
            .await
            .map_err(NetworkError::CommonSetupFailed)?;

        // Untagged: the cni subsystem carries one info record per attach
        info!(
            sandbox = %sandbox.id,
            netns = %netns.netns_path,
            endpoints = netns.endpoints.len(),
            "Network added"
        );
        Ok(netns)
    }

    /// Unbridge, detach and delete the namespace produced by [`Self::add`]
    pub async fn remove(&self, sandbox: &Sandbox, netns: &NetworkNamespace) -> Result<(), NetworkError> {
        self.common
            .teardown(netns)
            .await
            .map_err(NetworkError::CommonTeardownFailed)?;

        self.delete_virt_interfaces(netns).await?;

        // Forced whatever netns_created says
        self.namespaces
            .delete_net_ns(&netns.netns_path, true)
            .map_err(|source| NetworkError::NamespaceDeletionFailed {
                path: netns.netns_path.clone(),
                source,
            })?;

        info!(
            sandbox = %sandbox.id,
            netns = %netns.netns_path,
            "Network removed"
        );
        Ok(())
    }

    async fn add_virt_interfaces(&self, netns: &mut NetworkNamespace) -> Result<(), NetworkError> {
        let client = self
            .plugins
            .new_client()
            .map_err(NetworkError::ProviderUnavailable)?;

        for endpoint in netns.endpoints.iter_mut() {
            let Some(virt) = endpoint.as_plugin_attachable_mut() else {
                debug!(subsystem = SUBSYSTEM, "Skipping pass-through endpoint");
                continue;
            };

            let result = client
                .add_network(virt.id(), &netns.netns_path, virt.if_name())
                .await
                .map_err(|source| NetworkError::AttachFailed {
                    id: virt.id().to_string(),
                    if_name: virt.if_name().to_string(),
                    source,
                })?;

            info!(subsystem = SUBSYSTEM, result = ?result, "AddNetwork results");
            virt.set_properties(result);
        }

        Ok(())
    }

    async fn delete_virt_interfaces(&self, netns: &NetworkNamespace) -> Result<(), NetworkError> {
        let client = self
            .plugins
            .new_client()
            .map_err(NetworkError::ProviderUnavailable)?;

        for endpoint in &netns.endpoints {
            let Some(virt) = endpoint.as_plugin_attachable() else {
                continue;
            };

            client
                .remove_network(virt.id(), &netns.netns_path, virt.if_name())
                .await
                .map_err(|source| NetworkError::DetachFailed {
                    id: virt.id().to_string(),
                    if_name: virt.if_name().to_string(),
                    source,
                })?;

            debug!(subsystem = SUBSYSTEM, id = virt.id(), "RemoveNetwork done");
        }

        Ok(())
    }
}
