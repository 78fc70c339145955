//! Joins MAC ownership with address leases to find a guest's addresses.

use std::collections::HashSet;
use std::net::IpAddr;
use tracing::{trace, warn};

use crate::state::{BridgeState, Bridges};

/// Find every address currently leased to `domain`, across all bridges.
///
/// Bridges are visited in name order and leases in file order. A MAC owned by
/// `domain` on one bridge never matches a lease recorded on another bridge.
/// Leases whose address doesn't parse are skipped.
pub fn guest_addresses(domain: &str, bridges: &Bridges) -> Vec<IpAddr> {
    let mut addresses = Vec::new();

    for (bridge_name, bridge) in bridges {
        let macs = owned_macs(domain, bridge);
        if macs.is_empty() {
            continue;
        }

        for lease in &bridge.addresses {
            if !macs.contains(lease.mac.as_str()) {
                continue;
            }
            match lease.ip.parse::<IpAddr>() {
                Ok(ip) => {
                    trace!(bridge = %bridge_name, domain, mac = %lease.mac, %ip, "matched lease");
                    addresses.push(ip.to_canonical());
                }
                Err(_) => {
                    warn!(
                        bridge = %bridge_name,
                        domain,
                        mac = %lease.mac,
                        ip = %lease.ip,
                        "ignoring lease with unparseable address"
                    );
                }
            }
        }
    }

    addresses
}

/// MACs owned by `domain` on a single bridge.
fn owned_macs<'a>(domain: &str, bridge: &'a BridgeState) -> HashSet<&'a str> {
    bridge
        .macs
        .iter()
        .filter(|entry| entry.domain == domain)
        .flat_map(|entry| entry.macs.iter().map(String::as_str))
        .collect()
}
