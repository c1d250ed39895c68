//! Per-endpoint ingress filtering.
//!
//! An endpoint may carry an allow-list of source networks and ranges. The
//! driver materializes it as a dedicated iptables chain
//! `CONTAINER-<iface>` holding the accepts followed by a jump to the
//! operator-provisioned `CONTAINER-REJECT` chain, and hooks it into the
//! parent `CONTAINERS` chain with a jump matching traffic leaving through
//! the endpoint's host interface. Rule order is semantic: accepts precede
//! the reject, and the parent jump is inserted at position 1 so
//! per-endpoint rules take precedence.

use std::fmt;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use ipnet::Ipv4Net;
use tracing::{debug, info};

use crate::command::{CommandError, exec, exec_ignore_errors};

/// Parent chain traffic is dispatched from.
pub const CONTAINERS_CHAIN: &str = "CONTAINERS";
/// Parent chain implementing the final reject.
pub const CONTAINER_REJECT_CHAIN: &str = "CONTAINER-REJECT";
/// Prefix of per-endpoint chains.
const CHAIN_PREFIX: &str = "CONTAINER-";

#[derive(Debug, thiserror::Error)]
pub enum NetfilterError {
    #[error("could not parse IP, CIDR or range {0:?}")]
    BadFilterSpec(String),
    #[error("expected iptables chain not found: {0}")]
    ParentChainMissing(String),
    #[error("filter apply failed: {0}")]
    Apply(#[from] CommandError),
}

pub type Result<T> = std::result::Result<T, NetfilterError>;

/// Inclusive range of IPv4 source addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    pub from: Ipv4Addr,
    pub to: Ipv4Addr,
}

impl IpRange {
    /// Parse `A-B` with optional whitespace around either address.
    fn parse(token: &str) -> Option<IpRange> {
        let (from, to) = token.split_once('-')?;
        let from: Ipv4Addr = from.trim().parse().ok()?;
        let to: Ipv4Addr = to.trim().parse().ok()?;
        Some(IpRange { from, to })
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

/// Parse a single IP literal or CIDR into a prefix with host bits masked.
fn parse_ip_or_net(token: &str) -> Option<Ipv4Net> {
    let candidate = if token.contains('/') {
        token.to_string()
    } else {
        format!("{token}/32")
    };
    candidate.parse::<Ipv4Net>().ok().map(|net| net.trunc())
}

/// A parsed ingress allow-list: networks and ranges in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    pub allowed_nets: Vec<Ipv4Net>,
    pub allowed_ranges: Vec<IpRange>,
}

impl FilterConfig {
    /// Parse a comma-separated filter spec. Empty input means no
    /// filtering and yields `None`; any unparseable token aborts.
    pub fn parse(spec: &str) -> Result<Option<FilterConfig>> {
        if spec.is_empty() {
            return Ok(None);
        }
        let mut config = FilterConfig {
            allowed_nets: Vec::new(),
            allowed_ranges: Vec::new(),
        };
        for token in spec.split(',') {
            let token = token.trim();
            if let Some(net) = parse_ip_or_net(token) {
                config.allowed_nets.push(net);
            } else if let Some(range) = IpRange::parse(token) {
                config.allowed_ranges.push(range);
            } else {
                return Err(NetfilterError::BadFilterSpec(token.to_string()));
            }
        }
        Ok(Some(config))
    }
}

impl fmt::Display for FilterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for net in &self.allowed_nets {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{net}")?;
            first = false;
        }
        for range in &self.allowed_ranges {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{range}")?;
            first = false;
        }
        Ok(())
    }
}

/// Packet filter access used by [`FilterHandle`].
#[async_trait]
pub trait Firewall: Send + Sync {
    /// Whether a chain exists in the filter table.
    async fn chain_exists(&self, chain: &str) -> bool;

    /// Apply one rule; a failure aborts the sequence.
    async fn run(&self, args: &[String]) -> std::result::Result<(), CommandError>;

    /// Apply one rule, swallowing failures. Used for teardown where the
    /// rules may already be gone.
    async fn run_ignore_errors(&self, args: &[String]);
}

/// Production implementation driving `iptables(8)`.
pub struct IptablesCommand;

#[async_trait]
impl Firewall for IptablesCommand {
    async fn chain_exists(&self, chain: &str) -> bool {
        exec("iptables", &["-n", "--list", chain]).await.is_ok()
    }

    async fn run(&self, args: &[String]) -> std::result::Result<(), CommandError> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        exec("iptables", &args).await?;
        Ok(())
    }

    async fn run_ignore_errors(&self, args: &[String]) {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        exec_ignore_errors("iptables", &args).await;
    }
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

/// Ordered rule sequence installing the filter for interface `iface`.
fn install_rules(iface: &str, config: &FilterConfig) -> Vec<Vec<String>> {
    let chain = format!("{CHAIN_PREFIX}{iface}");
    let mut rules = Vec::new();
    rules.push(owned(&["-N", &chain]));
    for net in &config.allowed_nets {
        rules.push(owned(&["-A", &chain, "-s", &net.to_string(), "-j", "ACCEPT"]));
    }
    for range in &config.allowed_ranges {
        rules.push(owned(&[
            "-A",
            &chain,
            "-m",
            "iprange",
            "--src-range",
            &range.to_string(),
            "-j",
            "ACCEPT",
        ]));
    }
    rules.push(owned(&["-A", &chain, "-j", CONTAINER_REJECT_CHAIN]));
    rules.push(owned(&["-I", CONTAINERS_CHAIN, "1", "-o", iface, "-j", &chain]));
    rules
}

/// Ordered rule sequence removing the filter for interface `iface`.
fn removal_rules(iface: &str) -> Vec<Vec<String>> {
    let chain = format!("{CHAIN_PREFIX}{iface}");
    vec![
        owned(&["-D", CONTAINERS_CHAIN, "-o", iface, "-j", &chain]),
        owned(&["-F", &chain]),
        owned(&["-X", &chain]),
    ]
}

/// An applied ingress filter protecting one host-side interface.
#[derive(Debug)]
pub struct FilterHandle {
    iface_name: String,
    config: FilterConfig,
}

impl FilterHandle {
    pub fn new(iface_name: String, config: FilterConfig) -> Self {
        FilterHandle { iface_name, config }
    }

    /// Install the chain and rules. A mid-sequence failure leaves a
    /// partial state that [`FilterHandle::remove`] can clear.
    pub async fn apply(&self, firewall: &dyn Firewall) -> Result<()> {
        for chain in [CONTAINERS_CHAIN, CONTAINER_REJECT_CHAIN] {
            if !firewall.chain_exists(chain).await {
                return Err(NetfilterError::ParentChainMissing(chain.to_string()));
            }
        }
        for rule in install_rules(&self.iface_name, &self.config) {
            debug!(rule = %rule.join(" "), "iptables");
            firewall.run(&rule).await?;
        }
        info!(iface = %self.iface_name, "ingress filtering applied");
        Ok(())
    }

    /// Best-effort removal of the jump, the chain contents, and the chain.
    pub async fn remove(&self, firewall: &dyn Firewall) {
        for rule in removal_rules(&self.iface_name) {
            debug!(rule = %rule.join(" "), "iptables");
            firewall.run_ignore_errors(&rule).await;
        }
        info!(iface = %self.iface_name, "ingress filtering removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn parse_single_ip_becomes_slash32() {
        let config = FilterConfig::parse("1.1.1.1").unwrap().unwrap();
        assert_eq!(config.allowed_nets, vec!["1.1.1.1/32".parse().unwrap()]);
        assert!(config.allowed_ranges.is_empty());
    }

    #[test]
    fn parse_cidr_masks_host_bits() {
        let config = FilterConfig::parse("1.1.1.0/16").unwrap().unwrap();
        assert_eq!(config.allowed_nets, vec!["1.1.0.0/16".parse().unwrap()]);
    }

    #[test]
    fn parse_range() {
        let config = FilterConfig::parse("3.3.3.3-4.4.4.4").unwrap().unwrap();
        assert_eq!(
            config.allowed_ranges,
            vec![IpRange {
                from: "3.3.3.3".parse().unwrap(),
                to: "4.4.4.4".parse().unwrap(),
            }]
        );
    }

    #[test]
    fn parse_empty_means_no_filtering() {
        assert!(FilterConfig::parse("").unwrap().is_none());
    }

    #[test]
    fn parse_tolerates_whitespace() {
        let config = FilterConfig::parse("1.1.1.1, 3.3.3.3 -\t4.4.4.4,  2.2.2.25/16  ")
            .unwrap()
            .unwrap();
        assert_eq!(
            config.allowed_nets,
            vec!["1.1.1.1/32".parse().unwrap(), "2.2.0.0/16".parse().unwrap()]
        );
        assert_eq!(config.allowed_ranges[0].to_string(), "3.3.3.3-4.4.4.4");
    }

    #[test]
    fn parse_rejects_malformed_range() {
        let err = FilterConfig::parse("1.1.1.1-2").unwrap_err();
        assert!(matches!(err, NetfilterError::BadFilterSpec(token) if token == "1.1.1.1-2"));
    }

    #[test]
    fn parse_rejects_range_with_prefix() {
        assert!(FilterConfig::parse("1.1.1.1-2.2.2.2/24").is_err());
    }

    #[test]
    fn parse_rejects_invalid_literals() {
        for bad in ["1.1.1.1.1", "1.1.1.1/24/24", "257.1.1.1", "1.1.1.1/33"] {
            assert!(FilterConfig::parse(bad).is_err(), "should reject {bad}");
        }
    }

    #[test]
    fn parse_is_idempotent_through_display() {
        for spec in [
            "1.1.1.1,3.3.3.3-4.4.4.4,2.2.2.2/16",
            "10.0.0.0/8,192.168.1.1",
            "5.5.5.5-6.6.6.6",
        ] {
            let parsed = FilterConfig::parse(spec).unwrap().unwrap();
            let reparsed = FilterConfig::parse(&parsed.to_string()).unwrap().unwrap();
            assert_eq!(parsed, reparsed, "spec was: {spec}");
        }
    }

    /// Records every rule; parent chains exist unless listed as missing.
    struct FakeFirewall {
        missing_chains: Vec<&'static str>,
        rules: Mutex<Vec<String>>,
    }

    impl FakeFirewall {
        fn new() -> Self {
            FakeFirewall {
                missing_chains: Vec::new(),
                rules: Mutex::new(Vec::new()),
            }
        }

        fn rules(&self) -> Vec<String> {
            self.rules.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Firewall for FakeFirewall {
        async fn chain_exists(&self, chain: &str) -> bool {
            !self.missing_chains.contains(&chain)
        }

        async fn run(&self, args: &[String]) -> std::result::Result<(), CommandError> {
            self.rules.lock().unwrap().push(args.join(" "));
            Ok(())
        }

        async fn run_ignore_errors(&self, args: &[String]) {
            self.rules.lock().unwrap().push(args.join(" "));
        }
    }

    #[tokio::test]
    async fn apply_emits_rules_in_order() {
        let firewall = FakeFirewall::new();
        let config = FilterConfig::parse("10.0.0.0/8,192.168.1.1").unwrap().unwrap();
        let handle = FilterHandle::new("vethr1a2b".to_string(), config);
        handle.apply(&firewall).await.unwrap();
        assert_eq!(
            firewall.rules(),
            vec![
                "-N CONTAINER-vethr1a2b",
                "-A CONTAINER-vethr1a2b -s 10.0.0.0/8 -j ACCEPT",
                "-A CONTAINER-vethr1a2b -s 192.168.1.1/32 -j ACCEPT",
                "-A CONTAINER-vethr1a2b -j CONTAINER-REJECT",
                "-I CONTAINERS 1 -o vethr1a2b -j CONTAINER-vethr1a2b",
            ]
        );
    }

    #[tokio::test]
    async fn apply_emits_range_rules_after_nets() {
        let firewall = FakeFirewall::new();
        let config = FilterConfig::parse("3.3.3.3-4.4.4.4,10.0.0.0/8").unwrap().unwrap();
        let handle = FilterHandle::new("vethrcdef".to_string(), config);
        handle.apply(&firewall).await.unwrap();
        assert_eq!(
            firewall.rules(),
            vec![
                "-N CONTAINER-vethrcdef",
                "-A CONTAINER-vethrcdef -s 10.0.0.0/8 -j ACCEPT",
                "-A CONTAINER-vethrcdef -m iprange --src-range 3.3.3.3-4.4.4.4 -j ACCEPT",
                "-A CONTAINER-vethrcdef -j CONTAINER-REJECT",
                "-I CONTAINERS 1 -o vethrcdef -j CONTAINER-vethrcdef",
            ]
        );
    }

    #[tokio::test]
    async fn apply_fails_when_parent_chain_missing() {
        let firewall = FakeFirewall {
            missing_chains: vec![CONTAINER_REJECT_CHAIN],
            rules: Mutex::new(Vec::new()),
        };
        let config = FilterConfig::parse("10.0.0.0/8").unwrap().unwrap();
        let handle = FilterHandle::new("vethr1a2b".to_string(), config);
        let err = handle.apply(&firewall).await.unwrap_err();
        assert!(matches!(err, NetfilterError::ParentChainMissing(c) if c == "CONTAINER-REJECT"));
        assert!(firewall.rules().is_empty(), "no rules before the chain check");
    }

    #[tokio::test]
    async fn remove_emits_delete_flush_drop() {
        let firewall = FakeFirewall::new();
        let config = FilterConfig::parse("10.0.0.0/8").unwrap().unwrap();
        let handle = FilterHandle::new("vethr1a2b".to_string(), config);
        handle.remove(&firewall).await;
        assert_eq!(
            firewall.rules(),
            vec![
                "-D CONTAINERS -o vethr1a2b -j CONTAINER-vethr1a2b",
                "-F CONTAINER-vethr1a2b",
                "-X CONTAINER-vethr1a2b",
            ]
        );
    }
}
