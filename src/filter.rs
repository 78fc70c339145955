//! Subnet visibility rules applied to resolved guest addresses.

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// A single address-visibility rule.
///
/// Rules are evaluated in configured order; the first rule that reaches a
/// verdict for an address decides it. Configured as e.g.
/// `{ kind = "keep", cidr = "10.0.0.0/24" }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SubnetRule {
    /// Keep addresses inside `cidr`.
    Keep {
        /// Network to keep.
        cidr: IpNetwork,
    },
}

/// Outcome of evaluating one rule against one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The address is kept; no further rules are consulted.
    Keep,
    /// The rule has no opinion; try the next one.
    Undecided,
}

impl SubnetRule {
    /// Evaluate this rule against `ip`.
    pub fn evaluate(&self, ip: IpAddr) -> Verdict {
        match self {
            Self::Keep { cidr } => {
                if cidr.contains(ip) {
                    Verdict::Keep
                } else {
                    Verdict::Undecided
                }
            }
        }
    }
}

/// Whether `ip` survives `rules`. No rules means everything is visible.
pub fn is_visible(ip: IpAddr, rules: &[SubnetRule]) -> bool {
    if rules.is_empty() {
        return true;
    }

    for rule in rules {
        match rule.evaluate(ip) {
            Verdict::Keep => return true,
            Verdict::Undecided => continue,
        }
    }

    // Nothing kept it.
    false
}

/// Return the addresses from `ips` that survive `rules`, preserving order.
pub fn apply(ips: &[IpAddr], rules: &[SubnetRule]) -> Vec<IpAddr> {
    ips.iter()
        .copied()
        .filter(|ip| is_visible(*ip, rules))
        .collect()
}
