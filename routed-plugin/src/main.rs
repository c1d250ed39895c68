mod ipam;
mod net;
mod server;
mod wire;

use std::fmt;
use std::net::Ipv4Addr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use routed::{
    DEFAULT_MTU, DriverError, Firewall, IpCommand, IpamDriver, IptablesCommand, LinkOps,
    NetDriver, PrerequisiteError, check_prerequisites,
};
use tracing::info;
use tracing_subscriber::fmt::time::FormatTime;

const VERSION: &str = "0.1";

struct Elapsed(Instant);

impl FormatTime for Elapsed {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let d = self.0.elapsed();
        let total_secs = d.as_secs();
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        let millis = d.subsec_millis();
        write!(w, "[{mins:02}:{secs:02}:{millis:03}]")
    }
}

/// Docker routed network driver.
///
/// Run inside a privileged host-network container with
/// `/run/docker/plugins` mounted so Docker can find the sockets.
#[derive(Parser)]
#[command(name = "routed-plugin", version = VERSION)]
struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long)]
    debug: bool,

    /// IPAM plugin socket name
    #[arg(short = 's', long, default_value = "ipam-routed")]
    ipamsock: String,

    /// Network plugin socket name
    #[arg(short = 'S', long, default_value = "net-routed")]
    netsock: String,

    /// IPv4 address containers use as their default gateway
    #[arg(short = 'g', long)]
    gateway: Ipv4Addr,
}

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error("routed-plugin must run as root (it drives ip and iptables directly)")]
    NotRoot,
    #[error(transparent)]
    Prerequisites(#[from] PrerequisiteError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Serve(#[from] server::ServeError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_timer(Elapsed(Instant::now()))
        .with_max_level(if cli.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), RunError> {
    info!(version = VERSION, gateway = %cli.gateway, "initializing routed driver");

    if !nix::unistd::getuid().is_root() {
        return Err(RunError::NotRoot);
    }
    check_prerequisites()?;

    let links: Arc<dyn LinkOps> = Arc::new(IpCommand);
    let firewall: Arc<dyn Firewall> = Arc::new(IptablesCommand);
    let ipam_driver = Arc::new(IpamDriver::new(cli.gateway));
    let net_driver = Arc::new(NetDriver::new(cli.gateway, DEFAULT_MTU, links, firewall).await?);

    tokio::try_join!(
        server::serve(ipam::router(ipam_driver), &cli.ipamsock),
        server::serve(net::router(net_driver), &cli.netsock),
    )?;

    info!("routed driver stopped");
    Ok(())
}
