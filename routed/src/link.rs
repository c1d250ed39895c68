//! Kernel link and route operations behind a trait seam.
//!
//! The production implementation shells out to `ip(8)`; tests substitute a
//! recording fake so endpoint lifecycle logic runs without touching the
//! host network.

use async_trait::async_trait;
use ipnet::Ipv4Net;

use crate::command::{CommandError, exec, exec_ignore_errors};
use crate::mac::MacAddr;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("link operation failed: {0}")]
    Command(#[from] CommandError),
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// Kernel-facing link and route operations used by the endpoint manager.
#[async_trait]
pub trait LinkOps: Send + Sync {
    /// Create a veth pair with transmit queue length 0 on the host side.
    async fn create_veth(&self, host_name: &str, peer_name: &str) -> Result<()>;

    /// Set the MTU of a link.
    async fn set_mtu(&self, name: &str, mtu: u32) -> Result<()>;

    /// Set the hardware address of a link.
    async fn set_hwaddr(&self, name: &str, mac: MacAddr) -> Result<()>;

    /// Bring a link up.
    async fn set_up(&self, name: &str) -> Result<()>;

    /// Bring a link down.
    async fn set_down(&self, name: &str) -> Result<()>;

    /// Add a route to `dest` out of device `name`.
    async fn add_route(&self, dest: Ipv4Net, name: &str) -> Result<()>;

    /// Delete a link. Best-effort; the peer may already be gone.
    async fn delete(&self, name: &str);

    /// Names of all links in the default namespace.
    async fn list_names(&self) -> Result<Vec<String>>;

    /// Whether a link name currently resolves to an interface index.
    fn exists(&self, name: &str) -> bool;
}

/// Production implementation driving `ip(8)`.
pub struct IpCommand;

#[async_trait]
impl LinkOps for IpCommand {
    async fn create_veth(&self, host_name: &str, peer_name: &str) -> Result<()> {
        exec(
            "ip",
            &[
                "link", "add", host_name, "txqueuelen", "0", "type", "veth", "peer", "name",
                peer_name,
            ],
        )
        .await?;
        Ok(())
    }

    async fn set_mtu(&self, name: &str, mtu: u32) -> Result<()> {
        let mtu = mtu.to_string();
        exec("ip", &["link", "set", name, "mtu", &mtu]).await?;
        Ok(())
    }

    async fn set_hwaddr(&self, name: &str, mac: MacAddr) -> Result<()> {
        let mac = mac.to_string();
        exec("ip", &["link", "set", name, "address", &mac]).await?;
        Ok(())
    }

    async fn set_up(&self, name: &str) -> Result<()> {
        exec("ip", &["link", "set", name, "up"]).await?;
        Ok(())
    }

    async fn set_down(&self, name: &str) -> Result<()> {
        exec("ip", &["link", "set", name, "down"]).await?;
        Ok(())
    }

    async fn add_route(&self, dest: Ipv4Net, name: &str) -> Result<()> {
        let dest = dest.to_string();
        exec("ip", &["route", "add", &dest, "dev", name]).await?;
        Ok(())
    }

    async fn delete(&self, name: &str) {
        exec_ignore_errors("ip", &["link", "del", name]).await;
    }

    async fn list_names(&self) -> Result<Vec<String>> {
        let output = exec("ip", &["-o", "link", "show"]).await?;
        Ok(parse_link_names(&output))
    }

    fn exists(&self, name: &str) -> bool {
        nix::net::if_::if_nametoindex(name).is_ok()
    }
}

/// Parse link names out of `ip -o link show` output.
///
/// Each line looks like `2: eth0: <BROADCAST,...> mtu 1500 ...` or, for
/// paired devices, `5: vethr1a2b@if4: <...>`. The name is the second
/// colon-separated field with any `@peer` suffix stripped.
pub fn parse_link_names(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split(':').nth(1))
        .map(|field| {
            let field = field.trim();
            field.split('@').next().unwrap_or(field).to_string()
        })
        .filter(|name| !name.is_empty())
        .collect()
}
