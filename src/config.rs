//! Configuration types for libvirt-dns.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::GuestDnsError;
use crate::filter::SubnetRule;
use crate::state::DEFAULT_STATE_DIR;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// DNS server configuration.
    pub dns: DnsConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// What the server resolves. Only libvirt guests are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Resolve guest domain names to their leased addresses.
    Guest,
}

/// DNS server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Address for DNS server to listen on (UDP and TCP).
    pub listen_addr: SocketAddr,

    /// Resolution mode; must be present.
    pub mode: Mode,

    /// Directory holding libvirt's `<bridge>.macs` and `<bridge>.status` files.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// TTL for DNS records in seconds.
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Visibility rules, evaluated in order. Empty keeps every address.
    #[serde(default)]
    pub rules: Vec<SubnetRule>,

    /// Suffix removed from query names before looking up the guest
    /// (e.g. ".internal" so `vm1.internal.` resolves guest `vm1`).
    #[serde(default)]
    pub trim_suffix: Option<String>,

    /// Deadline for reading the state directory for one query, in milliseconds.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl DnsConfig {
    /// Configuration for `mode = "guest"` with every other field defaulted.
    pub fn guest(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            mode: Mode::Guest,
            state_dir: default_state_dir(),
            ttl: default_ttl(),
            rules: Vec::new(),
            trim_suffix: None,
            query_timeout_ms: default_query_timeout_ms(),
        }
    }

    /// Per-query resolution deadline.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// The trim suffix in canonical form: leading dot, no trailing dot.
    /// Returns `None` when unset or when it names the root.
    pub fn normalized_trim_suffix(&self) -> Option<String> {
        let suffix = self.trim_suffix.as_deref()?.trim_end_matches('.');
        let suffix = suffix.trim_start_matches('.');
        if suffix.is_empty() {
            return None;
        }
        Some(format!(".{suffix}"))
    }

    /// Reject values that deserialize but can't be served.
    pub fn validate(&self) -> Result<(), GuestDnsError> {
        if self.query_timeout_ms == 0 {
            return Err(GuestDnsError::Config(
                "query_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.state_dir.as_os_str().is_empty() {
            return Err(GuestDnsError::Config("state_dir must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "libvirt_dns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_DIR)
}

// libvirt guest records were historically served with a zero TTL.
fn default_ttl() -> u32 {
    0
}

fn default_query_timeout_ms() -> u64 {
    2000
}
