//! The network driver core: the single live network, the endpoint map,
//! and the kernel work behind each lifecycle operation.
//!
//! `CreateEndpoint` builds the veth pair, elects a MAC, and applies the
//! optional ingress filter; `Join` installs the host routes and hands the
//! container side to the runtime; `DeleteEndpoint` tears everything down
//! best-effort. All endpoint operations serialize on one mutex — veth
//! name generation needs race-free uniqueness against the kernel
//! namespace, so holding the lock across the kernel calls is deliberate.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use ipnet::Ipv4Net;
use plugin_proto::{
    CreateEndpointRequest, CreateEndpointResponse, CreateNetworkRequest, DeleteEndpointRequest,
    DeleteNetworkRequest, EndpointInterface, InfoRequest, InfoResponse, InterfaceName,
    JoinRequest, JoinResponse, LOCAL_SCOPE, LeaveRequest, NetCapabilities,
    ROUTE_TYPE_CONNECTED, ROUTE_TYPE_NEXTHOP, StaticRoute,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::link::{LinkError, LinkOps};
use crate::mac::MacAddr;
use crate::netfilter::{FilterConfig, FilterHandle, Firewall, NetfilterError};
use crate::options::{self, OptionError};

/// Prefix of every interface name this driver creates.
pub const VETH_PREFIX: &str = "vethr";
/// Prefix the runtime renames the container side to (`eth0`, `eth1`, ...).
const ETH_PREFIX: &str = "eth";
/// MTU applied when no option overrides it.
pub const DEFAULT_MTU: u32 = 1500;
/// Attempts at generating a non-colliding interface name.
const IFACE_NAME_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("failed to find name for new interface")]
    IfaceNameExhausted,
    #[error("no network exists")]
    NoNetwork,
    #[error("unknown endpoint {0}")]
    UnknownEndpoint(String),
    #[error("endpoint request carries no interface")]
    MissingInterface,
    #[error("invalid endpoint address {0:?}")]
    InvalidAddress(String),
    #[error("invalid ip alias {0:?}")]
    InvalidAlias(String),
    #[error(transparent)]
    Mac(#[from] crate::mac::MacParseError),
    #[error(transparent)]
    Option(#[from] OptionError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Netfilter(#[from] NetfilterError),
}

pub type Result<T> = std::result::Result<T, DriverError>;

struct Endpoint {
    host_iface_name: String,
    container_iface_name: String,
    mac_address: MacAddr,
    ipv4_address: Ipv4Net,
    ip_aliases: Vec<Ipv4Net>,
    filter: Option<FilterHandle>,
}

struct Network {
    id: String,
    endpoints: HashMap<String, Endpoint>,
}

/// The network service backing the `net-routed` socket.
pub struct NetDriver {
    gateway: Ipv4Addr,
    mtu: u32,
    links: Arc<dyn LinkOps>,
    firewall: Arc<dyn Firewall>,
    // Single-network driver: the slot holds at most one live network.
    network: Mutex<Option<Network>>,
}

impl NetDriver {
    /// Construct the driver and reconcile kernel state: any link left
    /// over from an unclean shutdown (name starts with [`VETH_PREFIX`])
    /// is deleted. Failure to enumerate links is fatal; per-link
    /// deletion failures are logged by the link layer and skipped.
    pub async fn new(
        gateway: Ipv4Addr,
        mtu: u32,
        links: Arc<dyn LinkOps>,
        firewall: Arc<dyn Firewall>,
    ) -> Result<Self> {
        for name in links.list_names().await? {
            if name.starts_with(VETH_PREFIX) {
                info!(link = %name, "cleaning up orphaned veth");
                links.delete(&name).await;
            }
        }
        Ok(NetDriver {
            gateway,
            mtu,
            links,
            firewall,
            network: Mutex::new(None),
        })
    }

    pub fn capabilities(&self) -> NetCapabilities {
        NetCapabilities {
            scope: LOCAL_SCOPE.to_string(),
        }
    }

    /// Install a fresh network in the single slot, replacing any
    /// previous one.
    pub async fn create_network(&self, r: &CreateNetworkRequest) {
        let mut slot = self.network.lock().await;
        if let Some(old) = slot.as_ref() {
            warn!(old = %old.id, new = %r.network_id, "replacing existing network");
        }
        *slot = Some(Network {
            id: r.network_id.clone(),
            endpoints: HashMap::new(),
        });
        info!(network = %r.network_id, "network created");
    }

    pub async fn delete_network(&self, r: &DeleteNetworkRequest) {
        let mut slot = self.network.lock().await;
        *slot = None;
        info!(network = %r.network_id, "network destroyed");
    }

    /// Generate an interface name: [`VETH_PREFIX`] plus four random hex
    /// characters, rejecting names that already resolve in the kernel or
    /// were handed out earlier in the same operation.
    fn generate_iface_name(&self, taken: &[&str]) -> Result<String> {
        for _ in 0..IFACE_NAME_ATTEMPTS {
            let name = format!("{VETH_PREFIX}{:04x}", rand::random::<u16>());
            if taken.contains(&name.as_str()) || self.links.exists(&name) {
                continue;
            }
            return Ok(name);
        }
        Err(DriverError::IfaceNameExhausted)
    }

    pub async fn create_endpoint(
        &self,
        r: &CreateEndpointRequest,
    ) -> Result<CreateEndpointResponse> {
        let mut slot = self.network.lock().await;
        let network = slot.as_mut().ok_or(DriverError::NoNetwork)?;

        let iface = r.interface.as_ref().ok_or(DriverError::MissingInterface)?;
        let address: Ipv4Net = iface
            .address
            .parse()
            .map_err(|_| DriverError::InvalidAddress(iface.address.clone()))?;

        let host_name = self.generate_iface_name(&[])?;
        let container_name = self.generate_iface_name(&[&host_name])?;

        // Kernel links created from here on; drained in reverse on error.
        let mut cleanup: Vec<String> = Vec::new();
        let result = self
            .build_endpoint(r, iface, address, &host_name, &container_name, &mut cleanup)
            .await;
        let endpoint = match result {
            Ok(ep) => ep,
            Err(e) => {
                for name in cleanup.iter().rev() {
                    self.links.delete(name).await;
                }
                return Err(e);
            }
        };

        let requested_mac = !iface.mac_address.is_empty();
        let response_mac = if requested_mac {
            // libnetwork rejects responses echoing a field the caller set.
            String::new()
        } else {
            endpoint.mac_address.to_string()
        };
        let aliases = endpoint.ip_aliases.iter().map(|a| a.to_string()).collect();

        network.endpoints.insert(r.endpoint_id.clone(), endpoint);
        info!(endpoint = %r.endpoint_id, host = %host_name, "endpoint created");

        Ok(CreateEndpointResponse {
            interface: Some(EndpointInterface {
                // IPAM owns the address; it must come back blank.
                address: String::new(),
                address_ipv6: String::new(),
                mac_address: response_mac,
                ip_aliases: aliases,
            }),
        })
    }

    /// The kernel-facing half of `create_endpoint`. Pushes created links
    /// onto `cleanup` so the caller can roll back on error.
    async fn build_endpoint(
        &self,
        r: &CreateEndpointRequest,
        iface: &EndpointInterface,
        address: Ipv4Net,
        host_name: &str,
        container_name: &str,
        cleanup: &mut Vec<String>,
    ) -> Result<Endpoint> {
        debug!(host = %host_name, container = %container_name, "adding veth pair");
        self.links.create_veth(host_name, container_name).await?;
        // Deleting the host side removes the peer with it.
        cleanup.push(host_name.to_string());

        let mtu = options::get_mtu(&r.options)?.unwrap_or(self.mtu);
        if mtu != 0 {
            for name in [host_name, container_name] {
                if let Err(e) = self.links.set_mtu(name, mtu).await {
                    warn!(link = %name, mtu, error = %e, "could not set mtu, leaving default");
                }
            }
        }

        // The link must be down while its hardware address changes.
        self.links.set_down(container_name).await?;

        let mac = match self.requested_mac(iface, r)? {
            Some(mac) => mac,
            None => MacAddr::from_ipv4(address.addr()),
        };
        self.links.set_hwaddr(container_name, mac).await?;

        self.links.set_up(host_name).await?;
        self.links.set_up(container_name).await?;

        let ip_aliases = parse_aliases(&r.options)?;

        let filter = match options::get_string(&r.options, plugin_proto::INGRESS_ALLOWED_OPTION)? {
            Some(spec) => match FilterConfig::parse(&spec)? {
                Some(config) => {
                    let handle = FilterHandle::new(host_name.to_string(), config);
                    if let Err(e) = handle.apply(self.firewall.as_ref()).await {
                        // Clear whatever part of the chain went in.
                        handle.remove(self.firewall.as_ref()).await;
                        return Err(e.into());
                    }
                    Some(handle)
                }
                None => None,
            },
            None => None,
        };

        Ok(Endpoint {
            host_iface_name: host_name.to_string(),
            container_iface_name: container_name.to_string(),
            mac_address: mac,
            ipv4_address: address,
            ip_aliases,
            filter,
        })
    }

    /// MAC requested by the caller, from the interface spec or the
    /// endpoint option, if any.
    fn requested_mac(
        &self,
        iface: &EndpointInterface,
        r: &CreateEndpointRequest,
    ) -> Result<Option<MacAddr>> {
        if !iface.mac_address.is_empty() {
            return Ok(Some(iface.mac_address.parse()?));
        }
        match options::get_string(&r.options, plugin_proto::MAC_ADDRESS_OPTION)? {
            Some(raw) => Ok(Some(raw.parse()?)),
            None => Ok(None),
        }
    }

    /// Remove the endpoint and its kernel objects. Best-effort: the
    /// runtime may already have destroyed the peer, so everything here
    /// logs and continues.
    pub async fn delete_endpoint(&self, r: &DeleteEndpointRequest) {
        let mut slot = self.network.lock().await;
        let Some(network) = slot.as_mut() else {
            warn!(endpoint = %r.endpoint_id, "delete for endpoint with no live network");
            return;
        };
        let Some(endpoint) = network.endpoints.remove(&r.endpoint_id) else {
            warn!(endpoint = %r.endpoint_id, "delete for unknown endpoint");
            return;
        };

        if self.links.exists(&endpoint.host_iface_name) {
            debug!(link = %endpoint.host_iface_name, "deleting host interface");
            self.links.delete(&endpoint.host_iface_name).await;
        } else {
            debug!(link = %endpoint.host_iface_name, "host interface already gone");
        }

        if let Some(filter) = &endpoint.filter {
            filter.remove(self.firewall.as_ref()).await;
        }
        info!(endpoint = %r.endpoint_id, "endpoint deleted");
    }

    pub async fn endpoint_info(&self, r: &InfoRequest) -> InfoResponse {
        debug!(network = %r.network_id, endpoint = %r.endpoint_id, "endpoint info");
        InfoResponse {
            value: HashMap::new(),
        }
    }

    /// Install the host routes and tell the runtime how to plumb the
    /// container side: the link to move and rename, and the two static
    /// routes that make the gateway reachable from a bare /32.
    pub async fn join(&self, r: &JoinRequest) -> Result<JoinResponse> {
        let slot = self.network.lock().await;
        let network = slot.as_ref().ok_or(DriverError::NoNetwork)?;
        let endpoint = network
            .endpoints
            .get(&r.endpoint_id)
            .ok_or_else(|| DriverError::UnknownEndpoint(r.endpoint_id.clone()))?;

        self.links
            .add_route(endpoint.ipv4_address, &endpoint.host_iface_name)
            .await?;
        for alias in &endpoint.ip_aliases {
            self.links
                .add_route(*alias, &endpoint.host_iface_name)
                .await?;
        }

        let response = JoinResponse {
            interface_name: InterfaceName {
                src_name: endpoint.container_iface_name.clone(),
                dst_prefix: ETH_PREFIX.to_string(),
            },
            gateway: String::new(),
            gateway_ipv6: String::new(),
            static_routes: vec![
                // The gateway is directly reachable on the single eth
                // interface even though the container only has a /32.
                StaticRoute {
                    destination: format!("{}/32", self.gateway),
                    route_type: ROUTE_TYPE_CONNECTED,
                    next_hop: String::new(),
                },
                StaticRoute {
                    destination: "0.0.0.0/0".to_string(),
                    route_type: ROUTE_TYPE_NEXTHOP,
                    next_hop: self.gateway.to_string(),
                },
            ],
            disable_gateway_service: true,
        };
        info!(endpoint = %r.endpoint_id, iface = %endpoint.container_iface_name, "endpoint joined");
        Ok(response)
    }

    /// Teardown happens in `delete_endpoint`; leaving is a no-op.
    pub async fn leave(&self, r: &LeaveRequest) {
        debug!(network = %r.network_id, endpoint = %r.endpoint_id, "leave");
    }

    #[cfg(test)]
    async fn network_id(&self) -> Option<String> {
        self.network.lock().await.as_ref().map(|n| n.id.clone())
    }

    #[cfg(test)]
    async fn endpoint_names(&self, endpoint_id: &str) -> Option<(String, String)> {
        let slot = self.network.lock().await;
        slot.as_ref()
            .and_then(|n| n.endpoints.get(endpoint_id))
            .map(|ep| {
                (
                    ep.host_iface_name.clone(),
                    ep.container_iface_name.clone(),
                )
            })
    }
}

/// Parse the comma-separated `ipAliases` option into prefixes.
fn parse_aliases(opts: &plugin_proto::Options) -> Result<Vec<Ipv4Net>> {
    let Some(raw) = options::get_string(opts, plugin_proto::IP_ALIASES_OPTION)? else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<Ipv4Net>()
                .map_err(|_| DriverError::InvalidAlias(token.to_string()))
        })
        .collect()
}
