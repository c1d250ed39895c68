mod command;
mod driver;
mod ipam;
mod link;
mod mac;
mod netfilter;
mod options;
mod prerequisites;

pub use command::CommandError;
pub use driver::{DEFAULT_MTU, DriverError, NetDriver, VETH_PREFIX};
pub use ipam::{IpamDriver, IpamError, POOL_ID, PoolGrant};
pub use link::{IpCommand, LinkError, LinkOps};
pub use mac::{MacAddr, MacParseError};
pub use netfilter::{
    FilterConfig, FilterHandle, Firewall, IpRange, IptablesCommand, NetfilterError,
};
pub use options::OptionError;
pub use prerequisites::{PrerequisiteError, check_prerequisites};
