//! Caller-directed IPAM for the routed network.
//!
//! The pool is process-scoped and in-memory: a subnet, the container
//! gateway, and the set of allocated /32 addresses. Addresses are always
//! supplied by the caller (Docker passes through the `--ip` the user gave
//! the container); the driver only checks for collisions. The gateway is
//! inserted into the allocated set at construction so it can never be
//! handed out.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use plugin_proto::{GATEWAY_OPTION, REQUEST_ADDRESS_TYPE_OPTION};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Stable identifier reported for the single pool.
pub const POOL_ID: &str = "routed";

/// Subnet used when the caller does not supply one.
const DEFAULT_SUBNET: &str = "10.46.0.0/16";

#[derive(Debug, thiserror::Error)]
pub enum IpamError {
    #[error("the gateway address is not allocatable")]
    GatewayNotAllocatable,
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),
    #[error("{0} already allocated")]
    AlreadyAllocated(String),
}

pub type Result<T> = std::result::Result<T, IpamError>;

struct Pool {
    subnet: Ipv4Net,
    allocated: HashSet<String>,
}

/// The IPAM service backing the `ipam-routed` socket.
pub struct IpamDriver {
    gateway: Ipv4Addr,
    pool: Mutex<Pool>,
}

/// Outcome of a successful `RequestPool`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolGrant {
    pub pool_id: String,
    pub subnet: String,
    pub gateway: String,
}

impl IpamDriver {
    pub fn new(gateway: Ipv4Addr) -> Self {
        #[allow(clippy::unwrap_used)] // compile-time constant subnet
        let subnet: Ipv4Net = DEFAULT_SUBNET.parse().unwrap();
        let mut allocated = HashSet::new();
        allocated.insert(format!("{gateway}/32"));
        IpamDriver {
            gateway,
            pool: Mutex::new(Pool { subnet, allocated }),
        }
    }

    /// Whether IPAM requires the runtime to pre-pick a MAC address.
    pub fn requires_mac_address(&self) -> bool {
        false
    }

    /// Grant the single pool, replacing the subnet with the caller's when
    /// it parses. The gateway travels back under the standard gateway
    /// label so libnetwork knows which address the driver reserves.
    pub async fn request_pool(&self, requested_subnet: &str) -> PoolGrant {
        let mut pool = self.pool.lock().await;
        if !requested_subnet.is_empty() {
            match requested_subnet.parse::<Ipv4Net>() {
                Ok(subnet) => pool.subnet = subnet,
                Err(_) => {
                    debug!(subnet = %requested_subnet, "ignoring unparseable pool subnet");
                }
            }
        }
        let grant = PoolGrant {
            pool_id: POOL_ID.to_string(),
            subnet: pool.subnet.to_string(),
            gateway: format!("{}/32", self.gateway),
        };
        info!(pool = %grant.subnet, gateway = %grant.gateway, "pool granted");
        grant
    }

    /// The pool is process-scoped; releasing it is a no-op.
    pub async fn release_pool(&self, pool_id: &str) {
        info!(pool_id = %pool_id, "pool released");
    }

    /// Allocate the caller-supplied address as a /32.
    pub async fn request_address(
        &self,
        address: &str,
        options: &std::collections::HashMap<String, String>,
    ) -> Result<String> {
        if options
            .get(REQUEST_ADDRESS_TYPE_OPTION)
            .is_some_and(|t| t == GATEWAY_OPTION)
        {
            return Err(IpamError::GatewayNotAllocatable);
        }
        if address.is_empty() {
            return Err(IpamError::InvalidAddress(address.to_string()));
        }
        let formatted = format!("{address}/32");
        if formatted.parse::<Ipv4Net>().is_err() {
            return Err(IpamError::InvalidAddress(address.to_string()));
        }

        let mut pool = self.pool.lock().await;
        if !pool.allocated.insert(formatted.clone()) {
            return Err(IpamError::AlreadyAllocated(formatted));
        }
        info!(address = %formatted, "address allocated");
        Ok(formatted)
    }

    /// Release an address; succeeds whether or not it was allocated.
    pub async fn release_address(&self, address: &str) {
        let formatted = format!("{address}/32");
        let mut pool = self.pool.lock().await;
        pool.allocated.remove(&formatted);
        info!(address = %formatted, "address released");
    }

    #[cfg(test)]
    async fn allocated(&self) -> HashSet<String> {
        self.pool.lock().await.allocated.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn driver() -> IpamDriver {
        IpamDriver::new("10.100.0.1".parse().unwrap())
    }

    #[tokio::test]
    async fn request_pool_replaces_subnet() {
        let d = driver();
        let grant = d.request_pool("10.1.0.0/16").await;
        assert_eq!(
            grant,
            PoolGrant {
                pool_id: "routed".to_string(),
                subnet: "10.1.0.0/16".to_string(),
                gateway: "10.100.0.1/32".to_string(),
            }
        );
        d.release_pool("routed").await;
    }

    #[tokio::test]
    async fn request_pool_keeps_default_subnet_when_empty() {
        let d = driver();
        let grant = d.request_pool("").await;
        assert_eq!(grant.subnet, "10.46.0.0/16");
    }

    #[tokio::test]
    async fn request_pool_ignores_unparseable_subnet() {
        let d = driver();
        let grant = d.request_pool("not-a-subnet").await;
        assert_eq!(grant.subnet, "10.46.0.0/16");
    }

    #[tokio::test]
    async fn double_request_fails_second_time() {
        let d = driver();
        let first = d.request_address("10.1.0.2", &HashMap::new()).await.unwrap();
        assert_eq!(first, "10.1.0.2/32");
        let second = d.request_address("10.1.0.2", &HashMap::new()).await;
        assert!(matches!(second, Err(IpamError::AlreadyAllocated(_))));
    }

    #[tokio::test]
    async fn release_makes_address_requestable_again() {
        let d = driver();
        d.request_address("10.1.0.2", &HashMap::new()).await.unwrap();
        d.release_address("10.1.0.2").await;
        let again = d.request_address("10.1.0.2", &HashMap::new()).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn release_of_unallocated_address_succeeds() {
        let d = driver();
        d.release_address("10.1.0.99").await;
    }

    #[tokio::test]
    async fn gateway_request_type_is_rejected() {
        let d = driver();
        let options = HashMap::from([(
            REQUEST_ADDRESS_TYPE_OPTION.to_string(),
            GATEWAY_OPTION.to_string(),
        )]);
        let res = d.request_address("10.1.0.5", &options).await;
        assert!(matches!(res, Err(IpamError::GatewayNotAllocatable)));
    }

    #[tokio::test]
    async fn gateway_collides_in_the_set() {
        let d = driver();
        let res = d.request_address("10.100.0.1", &HashMap::new()).await;
        assert!(matches!(res, Err(IpamError::AlreadyAllocated(_))));
    }

    #[tokio::test]
    async fn empty_address_is_invalid() {
        let d = driver();
        let res = d.request_address("", &HashMap::new()).await;
        assert!(matches!(res, Err(IpamError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn garbage_address_is_invalid() {
        let d = driver();
        let res = d.request_address("257.1.1.1", &HashMap::new()).await;
        assert!(matches!(res, Err(IpamError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn allocated_set_tracks_successful_requests() {
        let d = driver();
        d.request_address("10.1.0.2", &HashMap::new()).await.unwrap();
        d.request_address("10.1.0.3", &HashMap::new()).await.unwrap();
        let expected: HashSet<String> = ["10.100.0.1/32", "10.1.0.2/32", "10.1.0.3/32"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(d.allocated().await, expected);
    }
}
