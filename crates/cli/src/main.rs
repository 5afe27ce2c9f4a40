/// Ephemeral onion service publisher
///
/// Exposes a local port as a temporary hidden service via the local
/// daemon's control port. The service lives until Ctrl+C, is removed on
/// the way out, and by default is gated on a freshly generated
/// client-auth key pair whose private half is printed once for the
/// operator to hand to the client.

use anyhow::Result;
use clap::Parser;
use onion_common::{config::service::DEFAULT_SERVICE_PORT, default_control_addr, SessionConfig};
use onion_core::Session;
use std::net::SocketAddr;
use tracing::{info, Level};

#[derive(Debug, Parser)]
#[command(name = "onion-ephemeral", version, about = "Expose a local port as an ephemeral hidden service")]
struct Args {
    /// Local port to expose
    #[arg(short = 'l', long)]
    local_port: u16,

    /// Hidden service port
    #[arg(short = 'p', long, default_value_t = DEFAULT_SERVICE_PORT)]
    service_port: u16,

    /// Control port endpoint of the local daemon
    #[arg(long, default_value_t = default_control_addr())]
    control_addr: SocketAddr,

    /// Controller password, if the control port requires one
    #[arg(short = 'c', long)]
    password: Option<String>,

    /// Expose publicly, i.e. do not require client auth
    #[arg(long, default_value_t = false)]
    public: bool,
}

impl Args {
    fn into_config(self) -> SessionConfig {
        SessionConfig {
            control_addr: self.control_addr,
            local_port: self.local_port,
            service_port: self.service_port,
            password: self.password,
            public: self.public,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let args = Args::parse();
    info!(
        "publishing localhost:{} as an ephemeral service on {}",
        args.local_port, args.control_addr
    );

    let session = Session::new(args.into_config());
    session
        .run(async {
            // The handler stays installed for the process lifetime, so
            // further interrupts during teardown are absorbed
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
