//! DNS server setup and lifecycle management.

use hickory_server::authority::Catalog;
use hickory_server::ServerFuture;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::DnsConfig;
use crate::error::GuestDnsError;
use crate::handler::GuestHandler;

/// Idle timeout for TCP connections.
const TCP_TIMEOUT: Duration = Duration::from_secs(30);

/// DNS server answering libvirt guest names.
///
/// Queries the guest handler doesn't answer go to an empty [`Catalog`], which
/// refuses them.
pub struct DnsServer {
    config: DnsConfig,
}

impl DnsServer {
    /// Create a new DNS server with the given configuration.
    pub fn new(config: DnsConfig) -> Self {
        Self { config }
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &DnsConfig {
        &self.config
    }

    /// Run the DNS server until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), GuestDnsError> {
        self.config.validate()?;

        info!(
            listen_addr = %self.config.listen_addr,
            state_dir = %self.config.state_dir.display(),
            rules = self.config.rules.len(),
            trim_suffix = ?self.config.trim_suffix,
            "Starting libvirt-dns server"
        );

        if !self.config.state_dir.is_dir() {
            warn!(
                state_dir = %self.config.state_dir.display(),
                "state directory does not exist yet; guest queries will fail until it does"
            );
        }

        let listen_addr = self.config.listen_addr;
        let handler =
            GuestHandler::new(self.config, Catalog::new()).with_shutdown(shutdown.child_token());
        let mut server = ServerFuture::new(handler);

        // Bind UDP
        let udp_socket = UdpSocket::bind(listen_addr).await?;
        info!(addr = %listen_addr, "DNS UDP listening");
        server.register_socket(udp_socket);

        // Bind TCP
        let tcp_listener = TcpListener::bind(listen_addr).await?;
        info!(addr = %listen_addr, "DNS TCP listening");
        server.register_listener(tcp_listener, TCP_TIMEOUT);

        info!("DNS server ready to serve queries");

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("DNS server shutdown requested");
            }
            result = server.block_until_done() => {
                if let Err(e) = result {
                    error!("DNS server error: {}", e);
                    return Err(e.into());
                }
            }
        }

        info!("DNS server stopped");
        Ok(())
    }
}
