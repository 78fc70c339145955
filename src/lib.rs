//! libvirt DNS - answers DNS queries for libvirt guest domains.
//!
//! libvirt's dnsmasq integration records, per virtual bridge, which guest
//! owns which MAC address (`<bridge>.macs`) and which address was leased to
//! which MAC (`<bridge>.status`). This crate joins the two on every query and
//! answers A/AAAA queries for guest names, so `vm1.` resolves to whatever
//! address `vm1` currently holds.
//!
//! ## Features
//!
//! - A and AAAA answers synthesized from live libvirt state (no caching)
//! - Ordered `keep <cidr>` rules to hide addresses on private bridges
//! - Optional suffix trimming (`vm1.internal.` → guest `vm1`)
//! - Delegation to the next hickory `RequestHandler` for everything else
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         libvirt-dns                          │
//! │                                                              │
//! │  UDP/TCP ──▶ GuestHandler ──── delegate ────▶ next handler   │
//! │                  │                                           │
//! │                  ▼ per query                                 │
//! │   /var/lib/libvirt/dnsmasq/*.macs, *.status                  │
//! │                  │                                           │
//! │   join per bridge ─▶ keep rules ─▶ A/AAAA projection         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use libvirt_dns::{DnsConfig, GuestHandler};
//! use hickory_server::authority::Catalog;
//! use hickory_server::ServerFuture;
//!
//! let config = DnsConfig::guest("127.0.0.1:5353".parse().unwrap());
//! let handler = GuestHandler::new(config, Catalog::new());
//! let mut server = ServerFuture::new(handler);
//! ```

#![warn(missing_docs)]

pub mod answer;
pub mod config;
pub mod error;
pub mod filter;
pub mod handler;
pub mod metrics;
pub mod resolver;
pub mod server;
pub mod state;
pub mod telemetry;

// Re-export main types
pub use answer::{AddressFamily, ResolvedAnswer};
pub use config::{Config, DnsConfig, Mode, TelemetryConfig};
pub use error::GuestDnsError;
pub use filter::SubnetRule;
pub use handler::GuestHandler;
pub use server::DnsServer;
pub use state::{AddressEntry, BridgeState, MacEntry};
