//! Docker remote plugin wire protocol shared by the IPAM and network services.
//!
//! Remote plugins speak HTTP/1.1 over a unix socket under
//! [`PLUGIN_SOCKET_DIR`]. Every method is a `POST` with a JSON body and a
//! JSON response carrying [`CONTENT_TYPE`]. Docker discovers a plugin by
//! posting [`ACTIVATE_PATH`] and expects the list of implemented driver
//! interfaces back; failures on any method are HTTP 500 with an
//! [`ErrorResponse`] body.
//!
//! ## Methods
//!
//! | Path                                  | Request                   | Response                  |
//! |---------------------------------------|---------------------------|---------------------------|
//! | `/Plugin.Activate`                    | (empty)                   | [`ActivateResponse`]      |
//! | `/IpamDriver.GetCapabilities`         | (empty)                   | [`IpamCapabilities`]      |
//! | `/IpamDriver.GetDefaultAddressSpaces` | (empty)                   | [`AddressSpaces`]         |
//! | `/IpamDriver.RequestPool`             | [`RequestPoolRequest`]    | [`RequestPoolResponse`]   |
//! | `/IpamDriver.ReleasePool`             | [`ReleasePoolRequest`]    | `{}`                      |
//! | `/IpamDriver.RequestAddress`          | [`RequestAddressRequest`] | [`RequestAddressResponse`]|
//! | `/IpamDriver.ReleaseAddress`          | [`ReleaseAddressRequest`] | `{}`                      |
//! | `/NetworkDriver.GetCapabilities`      | (empty)                   | [`NetCapabilities`]       |
//! | `/NetworkDriver.CreateNetwork`        | [`CreateNetworkRequest`]  | `{}`                      |
//! | `/NetworkDriver.DeleteNetwork`        | [`DeleteNetworkRequest`]  | `{}`                      |
//! | `/NetworkDriver.CreateEndpoint`       | [`CreateEndpointRequest`] | [`CreateEndpointResponse`]|
//! | `/NetworkDriver.DeleteEndpoint`       | [`DeleteEndpointRequest`] | `{}`                      |
//! | `/NetworkDriver.EndpointOperInfo`     | [`InfoRequest`]           | [`InfoResponse`]          |
//! | `/NetworkDriver.Join`                 | [`JoinRequest`]           | [`JoinResponse`]          |
//! | `/NetworkDriver.Leave`                | [`LeaveRequest`]          | `{}`                      |
//!
//! Field names on the wire are the protocol's PascalCase ones; the types
//! here rename accordingly so handlers work with idiomatic field names.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Content type for plugin requests and responses.
pub const CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1.1+json";

/// Directory where Docker looks for plugin sockets.
pub const PLUGIN_SOCKET_DIR: &str = "/run/docker/plugins";

/// Handshake path posted by Docker on plugin discovery.
pub const ACTIVATE_PATH: &str = "/Plugin.Activate";

/// Driver interface names reported by [`ActivateResponse`].
pub const IPAM_DRIVER: &str = "IpamDriver";
pub const NETWORK_DRIVER: &str = "NetworkDriver";

// IPAM service method paths.
pub const IPAM_GET_CAPABILITIES_PATH: &str = "/IpamDriver.GetCapabilities";
pub const IPAM_GET_DEFAULT_ADDRESS_SPACES_PATH: &str = "/IpamDriver.GetDefaultAddressSpaces";
pub const IPAM_REQUEST_POOL_PATH: &str = "/IpamDriver.RequestPool";
pub const IPAM_RELEASE_POOL_PATH: &str = "/IpamDriver.ReleasePool";
pub const IPAM_REQUEST_ADDRESS_PATH: &str = "/IpamDriver.RequestAddress";
pub const IPAM_RELEASE_ADDRESS_PATH: &str = "/IpamDriver.ReleaseAddress";

// Network service method paths.
pub const NET_GET_CAPABILITIES_PATH: &str = "/NetworkDriver.GetCapabilities";
pub const NET_CREATE_NETWORK_PATH: &str = "/NetworkDriver.CreateNetwork";
pub const NET_DELETE_NETWORK_PATH: &str = "/NetworkDriver.DeleteNetwork";
pub const NET_CREATE_ENDPOINT_PATH: &str = "/NetworkDriver.CreateEndpoint";
pub const NET_DELETE_ENDPOINT_PATH: &str = "/NetworkDriver.DeleteEndpoint";
pub const NET_ENDPOINT_OPER_INFO_PATH: &str = "/NetworkDriver.EndpointOperInfo";
pub const NET_JOIN_PATH: &str = "/NetworkDriver.Join";
pub const NET_LEAVE_PATH: &str = "/NetworkDriver.Leave";

/// Network driver scope reported by capabilities.
pub const LOCAL_SCOPE: &str = "local";

// Option keys recognized by the drivers. Network options may arrive
// nested under GENERIC_OPTIONS.
pub const MTU_OPTION: &str = "com.medallia.routed.network.mtu";
pub const IP_ALIASES_OPTION: &str = "com.medallia.routed.network.ipAliases";
pub const INGRESS_ALLOWED_OPTION: &str = "com.medallia.routed.network.ingressAllowed";
pub const MAC_ADDRESS_OPTION: &str = "com.docker.network.endpoint.macaddress";
pub const GATEWAY_OPTION: &str = "com.docker.network.gateway";
pub const GENERIC_OPTIONS: &str = "com.docker.network.generic";
pub const REQUEST_ADDRESS_TYPE_OPTION: &str = "RequestAddressType";

/// Static route types understood by libnetwork.
pub const ROUTE_TYPE_NEXTHOP: u32 = 0;
pub const ROUTE_TYPE_CONNECTED: u32 = 1;

/// Untyped option map sent with network driver requests.
pub type Options = HashMap<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateResponse {
    #[serde(rename = "Implements")]
    pub implements: Vec<String>,
}

/// Error envelope returned with HTTP 500 for any failed method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "Err")]
    pub err: String,
}

// ---------------------------------------------------------------------------
// IPAM service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpamCapabilities {
    #[serde(rename = "RequiresMACAddress")]
    pub requires_mac_address: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddressSpaces {
    pub local_default_address_space: String,
    pub global_default_address_space: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RequestPoolRequest {
    pub address_space: String,
    pub pool: String,
    pub sub_pool: String,
    pub options: HashMap<String, String>,
    #[serde(rename = "V6")]
    pub v6: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestPoolResponse {
    #[serde(rename = "PoolID")]
    pub pool_id: String,
    pub pool: String,
    pub data: HashMap<String, String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleasePoolRequest {
    #[serde(rename = "PoolID")]
    pub pool_id: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RequestAddressRequest {
    #[serde(rename = "PoolID")]
    pub pool_id: String,
    pub address: String,
    pub options: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestAddressResponse {
    pub address: String,
    pub data: HashMap<String, String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ReleaseAddressRequest {
    #[serde(rename = "PoolID")]
    pub pool_id: String,
    pub address: String,
}

// ---------------------------------------------------------------------------
// Network service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetCapabilities {
    #[serde(rename = "Scope")]
    pub scope: String,
}

/// Address data passed by the IPAM side on network creation. This driver
/// leaves addressing to its IPAM service and ignores these.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct IpamData {
    pub address_space: String,
    pub pool: String,
    pub gateway: String,
    pub aux_addresses: Options,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateNetworkRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    pub options: Options,
    #[serde(rename = "IPv4Data")]
    pub ipv4_data: Vec<IpamData>,
    #[serde(rename = "IPv6Data")]
    pub ipv6_data: Vec<IpamData>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteNetworkRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
}

/// Interface description exchanged with `CreateEndpoint`. In requests the
/// address is the one leased by IPAM; in responses a driver must leave
/// every field it was given blank and may only fill what it chose itself.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EndpointInterface {
    pub address: String,
    #[serde(rename = "AddressIPv6")]
    pub address_ipv6: String,
    pub mac_address: String,
    #[serde(rename = "IPAliases")]
    pub ip_aliases: Vec<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateEndpointRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(rename = "EndpointID")]
    pub endpoint_id: String,
    pub interface: Option<EndpointInterface>,
    pub options: Options,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEndpointResponse {
    #[serde(rename = "Interface")]
    pub interface: Option<EndpointInterface>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DeleteEndpointRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(rename = "EndpointID")]
    pub endpoint_id: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InfoRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(rename = "EndpointID")]
    pub endpoint_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResponse {
    #[serde(rename = "Value")]
    pub value: HashMap<String, String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct JoinRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(rename = "EndpointID")]
    pub endpoint_id: String,
    pub sandbox_key: String,
    pub options: Options,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InterfaceName {
    pub src_name: String,
    pub dst_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StaticRoute {
    pub destination: String,
    pub route_type: u32,
    pub next_hop: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JoinResponse {
    pub interface_name: InterfaceName,
    pub gateway: String,
    #[serde(rename = "GatewayIPv6")]
    pub gateway_ipv6: String,
    pub static_routes: Vec<StaticRoute>,
    pub disable_gateway_service: bool,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LeaveRequest {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(rename = "EndpointID")]
    pub endpoint_id: String,
}
