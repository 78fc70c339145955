//! Loader for the libvirt dnsmasq state directory.
//!
//! libvirt writes two JSON files per virtual bridge into its dnsmasq state
//! directory:
//!
//! - `<bridge>.macs`: which guest domain owns which MAC addresses
//! - `<bridge>.status`: which address dnsmasq leased to which MAC
//!
//! The directory is re-read on every call; nothing is cached between queries.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::GuestDnsError;

/// Default libvirt dnsmasq state directory.
pub const DEFAULT_STATE_DIR: &str = "/var/lib/libvirt/dnsmasq";

/// Extension of the MAC-ownership files.
const MACS_EXTENSION: &str = "macs";

/// Extension of the address-lease files.
const STATUS_EXTENSION: &str = "status";

/// MAC addresses owned by a guest domain on one bridge.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MacEntry {
    /// Guest domain name as known to libvirt.
    pub domain: String,
    /// Hardware addresses of the domain's interfaces on this bridge.
    pub macs: Vec<String>,
}

/// An address leased to a hardware address.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AddressEntry {
    /// Hardware address holding the lease.
    #[serde(rename = "mac-address")]
    pub mac: String,
    /// Leased address, unparsed.
    #[serde(rename = "ip-address")]
    pub ip: String,
}

/// Everything libvirt recorded for a single bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeState {
    /// Entries from `<bridge>.macs`, in file order.
    pub macs: Vec<MacEntry>,
    /// Entries from `<bridge>.status`, in file order.
    pub addresses: Vec<AddressEntry>,
}

/// Bridge name -> state, ordered by bridge name.
pub type Bridges = BTreeMap<String, BridgeState>;

/// What kind of state a file in the directory holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StateFileKind {
    Macs,
    Status,
}

impl StateFileKind {
    /// Split a file name into its bridge name and kind.
    /// Returns `None` for files we don't understand.
    fn classify(file_name: &str) -> Option<(&str, Self)> {
        let (bridge, ext) = file_name.rsplit_once('.')?;
        let kind = match ext {
            MACS_EXTENSION => Self::Macs,
            STATUS_EXTENSION => Self::Status,
            _ => return None,
        };
        Some((bridge, kind))
    }
}

/// Read and decode every state file in `dir`.
///
/// Any unreadable or undecodable classified file fails the whole load; the
/// bridges parsed so far are discarded. Directories, including symlinks to
/// directories, are skipped. `cancel` is checked before the directory is
/// enumerated and around each file read.
pub fn load_state_dir(dir: &Path, cancel: &CancellationToken) -> Result<Bridges, GuestDnsError> {
    if cancel.is_cancelled() {
        return Err(GuestDnsError::Cancelled);
    }

    let entries = fs::read_dir(dir).map_err(|source| GuestDnsError::DirectoryUnavailable {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut bridges = Bridges::new();

    for entry in entries {
        let entry = entry.map_err(|source| GuestDnsError::DirectoryUnavailable {
            path: dir.to_path_buf(),
            source,
        })?;

        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            trace!(name = ?entry.file_name(), "skipping non-UTF-8 file name");
            continue;
        };
        let Some((bridge_name, kind)) = StateFileKind::classify(file_name) else {
            trace!(file = %file_name, "skipping unrecognized file");
            continue;
        };

        if cancel.is_cancelled() {
            return Err(GuestDnsError::Cancelled);
        }

        let path = entry.path();
        let metadata = fs::metadata(&path).map_err(|source| GuestDnsError::ReadState {
            path: path.clone(),
            source,
        })?;
        if metadata.is_dir() {
            trace!(file = %file_name, "skipping directory");
            continue;
        }

        let bridge = bridges.entry(bridge_name.to_string()).or_default();
        match kind {
            StateFileKind::Macs => bridge.macs = read_records(&path)?,
            StateFileKind::Status => bridge.addresses = read_records(&path)?,
        }

        if cancel.is_cancelled() {
            return Err(GuestDnsError::Cancelled);
        }
    }

    debug!(dir = %dir.display(), bridges = bridges.len(), "loaded libvirt state");
    Ok(bridges)
}

fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, GuestDnsError> {
    let contents = fs::read(path).map_err(|source| GuestDnsError::ReadState {
        path: PathBuf::from(path),
        source,
    })?;
    serde_json::from_slice(&contents).map_err(|source| GuestDnsError::RecordDecode {
        path: PathBuf::from(path),
        source,
    })
}
