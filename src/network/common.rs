//! Provider-agnostic bridge and TAP plumbing
//!
//! After the plugin has configured each veth inside the namespace, the veth is
//! bridged to a TAP device that the hypervisor exposes to the guest.

use std::future::Future;
use std::process::Command;

use async_trait::async_trait;
use futures_util::stream::TryStreamExt;
use rtnetlink::packet_route::link::{LinkAttribute, LinkMessage};
use rtnetlink::{new_connection, Handle, LinkBridge, LinkUnspec};
use tracing::{debug, info};

use crate::endpoint::{NetPair, VirtualEndpoint};
use crate::error::PlumbingError;
use crate::network::namespace::NamespaceLifecycle;
use crate::network::{NetworkNamespace, Sandbox};

/// Common setup/teardown trait
pub trait CommonNetwork {
    fn setup(
        &self,
        sandbox: &Sandbox,
        netns: &mut NetworkNamespace,
    ) -> impl Future<Output = Result<(), PlumbingError>> + Send;
    fn teardown(
        &self,
        netns: &NetworkNamespace,
    ) -> impl Future<Output = Result<(), PlumbingError>> + Send;
}

/// VM side of the wiring
#[async_trait]
pub trait Hypervisor: Send + Sync {
    async fn add_net_device(&self, endpoint: &VirtualEndpoint) -> Result<(), PlumbingError>;
}

/// Bridges every virtual endpoint to its TAP device inside the namespace
#[derive(Debug, Clone)]
pub struct BridgedNetwork<N> {
    namespaces: N,
}

impl<N: NamespaceLifecycle> BridgedNetwork<N> {
    pub fn new(namespaces: N) -> Self {
        Self { namespaces }
    }

    /// Open a netlink socket bound to the namespace
    fn connect(&self, netns_path: &str) -> Result<Handle, PlumbingError> {
        let (connection, handle, _) = self.namespaces.run(netns_path, || {
            new_connection().map_err(|e| PlumbingError::Netlink {
                link: netns_path.to_string(),
                reason: e.to_string(),
            })
        })?;

        tokio::spawn(connection);
        Ok(handle)
    }

    /// Blocks the worker thread on `ip tuntap` while it is inside the namespace
    fn create_tap(&self, netns_path: &str, name: &str) -> Result<(), PlumbingError> {
        self.namespaces.run(netns_path, || {
            let output = Command::new("ip")
                .args(["tuntap", "add", "dev", name, "mode", "tap"])
                .output()
                .map_err(|e| PlumbingError::Tap {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(PlumbingError::Tap {
                    name: name.to_string(),
                    reason: stderr.trim().to_string(),
                });
            }

            Ok(())
        })
    }
}

impl<N: NamespaceLifecycle> CommonNetwork for BridgedNetwork<N> {
    async fn setup(&self, sandbox: &Sandbox, netns: &mut NetworkNamespace) -> Result<(), PlumbingError> {
        if netns.endpoints.iter().all(|e| e.as_plugin_attachable().is_none()) {
            return Ok(());
        }

        let handle = self.connect(&netns.netns_path)?;

        for endpoint in netns.endpoints.iter_mut() {
            let Some(virt) = endpoint.as_plugin_attachable_mut() else {
                continue;
            };

            self.create_tap(&netns.netns_path, &virt.net_pair.tap_iface.name)?;
            bridge_pair(&handle, &mut virt.net_pair).await?;

            if let Some(hypervisor) = sandbox.hypervisor() {
                hypervisor.add_net_device(virt).await?;
            }

            info!(
                sandbox = %sandbox.id,
                bridge = %virt.net_pair.name,
                tap = %virt.net_pair.tap_iface.name,
                "Bridged endpoint"
            );
        }

        Ok(())
    }

    async fn teardown(&self, netns: &NetworkNamespace) -> Result<(), PlumbingError> {
        if netns.endpoints.iter().all(|e| e.as_plugin_attachable().is_none()) {
            return Ok(());
        }

        let handle = self.connect(&netns.netns_path)?;

        for endpoint in &netns.endpoints {
            let Some(virt) = endpoint.as_plugin_attachable() else {
                continue;
            };

            unbridge_pair(&handle, &virt.net_pair).await?;
            debug!(bridge = %virt.net_pair.name, "Unbridged endpoint");
        }

        Ok(())
    }
}

async fn bridge_pair(handle: &Handle, pair: &mut NetPair) -> Result<(), PlumbingError> {
    let veth = link_by_name(handle, &pair.virt_iface.name).await?;
    let tap = link_by_name(handle, &pair.tap_iface.name).await?;

    // The guest NIC keeps the address the plugin saw on the veth
    pair.tap_iface.hard_addr = link_address(&veth).unwrap_or_default();
    let generated = parse_hard_addr(&pair.virt_iface.hard_addr)?;
    set_link(
        handle,
        &pair.virt_iface.name,
        LinkUnspec::new_with_index(veth.header.index).address(generated).build(),
    )
    .await?;

    handle
        .link()
        .add(LinkBridge::new(&pair.name).build())
        .execute()
        .await
        .map_err(|e| netlink_error(&pair.name, e))?;
    let bridge = link_by_name(handle, &pair.name).await?;
    let bridge_index = bridge.header.index;

    for (name, index) in [
        (&pair.tap_iface.name, tap.header.index),
        (&pair.virt_iface.name, veth.header.index),
    ] {
        set_link(
            handle,
            name,
            LinkUnspec::new_with_index(index).controller(bridge_index).up().build(),
        )
        .await?;
    }

    set_link(handle, &pair.name, LinkUnspec::new_with_index(bridge_index).up().build()).await
}

async fn unbridge_pair(handle: &Handle, pair: &NetPair) -> Result<(), PlumbingError> {
    let tap = link_by_name(handle, &pair.tap_iface.name).await?;
    let veth = link_by_name(handle, &pair.virt_iface.name).await?;
    let bridge = link_by_name(handle, &pair.name).await?;

    set_link(
        handle,
        &pair.tap_iface.name,
        LinkUnspec::new_with_index(tap.header.index).nocontroller().down().build(),
    )
    .await?;

    let mut veth_reset = LinkUnspec::new_with_index(veth.header.index).nocontroller().down();
    if !pair.tap_iface.hard_addr.is_empty() {
        veth_reset = veth_reset.address(parse_hard_addr(&pair.tap_iface.hard_addr)?);
    }
    set_link(handle, &pair.virt_iface.name, veth_reset.build()).await?;

    for (name, index) in [(&pair.name, bridge.header.index), (&pair.tap_iface.name, tap.header.index)] {
        handle
            .link()
            .del(index)
            .execute()
            .await
            .map_err(|e| netlink_error(name, e))?;
    }

    Ok(())
}

async fn link_by_name(handle: &Handle, name: &str) -> Result<LinkMessage, PlumbingError> {
    let mut links = handle.link().get().match_name(name.to_string()).execute();
    match links.try_next().await {
        Ok(Some(link)) => Ok(link),
        Ok(None) => Err(PlumbingError::LinkNotFound {
            name: name.to_string(),
        }),
        Err(e) => Err(netlink_error(name, e)),
    }
}

async fn set_link(handle: &Handle, name: &str, message: LinkMessage) -> Result<(), PlumbingError> {
    debug!(link = name, "Updating link");
    handle
        .link()
        .set(message)
        .execute()
        .await
        .map_err(|e| netlink_error(name, e))
}

fn link_address(link: &LinkMessage) -> Option<String> {
    link.attributes.iter().find_map(|attr| match attr {
        LinkAttribute::Address(bytes) => Some(format_hard_addr(bytes)),
        _ => None,
    })
}

fn netlink_error(link: &str, e: rtnetlink::Error) -> PlumbingError {
    PlumbingError::Netlink {
        link: link.to_string(),
        reason: e.to_string(),
    }
}

/// Parse `aa:bb:cc:dd:ee:ff` into six bytes
pub fn parse_hard_addr(value: &str) -> Result<Vec<u8>, PlumbingError> {
    let bytes = value
        .split(':')
        .map(|part| {
            if part.len() == 2 {
                u8::from_str_radix(part, 16).ok()
            } else {
                None
            }
        })
        .collect::<Option<Vec<u8>>>()
        .filter(|bytes| bytes.len() == 6)
        .ok_or_else(|| PlumbingError::InvalidHardwareAddr(value.to_string()))?;

    Ok(bytes)
}

pub fn format_hard_addr(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Hypervisor that only records what it was handed
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingHypervisor {
    pub devices: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
#[async_trait]
impl Hypervisor for RecordingHypervisor {
    async fn add_net_device(&self, endpoint: &VirtualEndpoint) -> Result<(), PlumbingError> {
        self.devices
            .lock()
            .unwrap()
            .push(endpoint.net_pair.tap_iface.name.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::endpoint::{Endpoint, PhysicalEndpoint};
    use crate::error::NamespaceError;
    use crate::network::NetworkConfig;

    /// Lifecycle that fails the test if the namespace is ever entered
    struct UntouchedNamespaces;

    impl NamespaceLifecycle for UntouchedNamespaces {
        fn init(&self, _config: &NetworkConfig) -> Result<(String, bool), NamespaceError> {
            unreachable!("init")
        }

        fn run<T, E, F>(&self, _netns_path: &str, _callback: F) -> Result<T, E>
        where
            F: FnOnce() -> Result<T, E>,
            E: From<NamespaceError>,
        {
            panic!("namespace entered without virtual endpoints")
        }

        fn delete_net_ns(&self, _netns_path: &str, _force: bool) -> Result<(), NamespaceError> {
            unreachable!("delete_net_ns")
        }
    }

    #[test]
    fn test_parse_hard_addr() {
        assert_eq!(
            parse_hard_addr("02:00:ca:fe:00:01").unwrap(),
            vec![0x02, 0x00, 0xca, 0xfe, 0x00, 0x01]
        );
        assert!(parse_hard_addr("02:00:ca:fe:00").is_err());
        assert!(parse_hard_addr("02:00:ca:fe:00:zz").is_err());
        assert!(parse_hard_addr("2:00:ca:fe:00:01").is_err());
        assert!(parse_hard_addr("").is_err());
    }

    #[test]
    fn test_format_hard_addr() {
        assert_eq!(format_hard_addr(&[0x0a, 0x58, 0x0a, 0x58, 0x00, 0x05]), "0a:58:0a:58:00:05");
    }

    #[tokio::test]
    async fn test_pass_through_only_namespace_is_left_alone() {
        let common = BridgedNetwork::new(UntouchedNamespaces);
        let mut netns = NetworkNamespace {
            netns_path: "/var/run/netns/sb".to_string(),
            netns_created: false,
            endpoints: vec![Endpoint::Physical(PhysicalEndpoint::new("enp3s0", "0000:03:00.0"))],
        };

        let hypervisor = Arc::new(RecordingHypervisor::default());
        let sandbox = Sandbox::new("sb-1").with_hypervisor(hypervisor.clone());

        common.setup(&sandbox, &mut netns).await.unwrap();
        common.teardown(&netns).await.unwrap();
        assert!(hypervisor.devices.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recording_hypervisor() {
        let hypervisor = RecordingHypervisor::default();
        hypervisor.add_net_device(&VirtualEndpoint::new(3)).await.unwrap();
        assert_eq!(*hypervisor.devices.lock().unwrap(), vec!["tap3".to_string()]);
    }
}
