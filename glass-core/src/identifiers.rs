//! Identifier extraction
//!
//! Turns a transaction bundle into the tuple that names a client in the
//! store: `(duid, interface_id, remote_id)`, plus the display-only DUID
//! link-layer string and the address of the relay closest to the client.
//!
//! Opaque relay-supplied bytes are shown as text when they are plain
//! ASCII and as `0x`-prefixed lowercase hex otherwise. Truncated or absent
//! fields degrade to hex or an empty string, never to an error.

use std::net::Ipv6Addr;

use crate::derive::duid_link_layer_address;
use crate::dhcp::{RemoteId, TransactionBundle};
use crate::error::ExtractError;

/// Hardware type for Ethernet (RFC 826 / IANA ARP parameters).
const HARDWARE_TYPE_ETHERNET: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentifiers {
    pub duid: String,
    pub duid_ll: String,
    pub interface_id: String,
    pub remote_id: String,
    pub peer_address: Option<Ipv6Addr>,
}

pub fn extract(bundle: &TransactionBundle) -> Result<ClientIdentifiers, ExtractError> {
    let duid_bytes = bundle
        .request
        .client_duid()
        .ok_or(ExtractError::MissingClientId)?;
    if duid_bytes.is_empty() {
        return Err(ExtractError::EmptyClientId);
    }

    let relay = bundle.closest_relay();

    let interface_id = relay
        .and_then(|r| r.interface_id())
        .map(render_opaque)
        .unwrap_or_default();

    let remote_id = relay
        .and_then(|r| r.remote_id_data())
        .map(render_remote_id)
        .unwrap_or_default();

    Ok(ClientIdentifiers {
        duid: render_hex(duid_bytes),
        duid_ll: render_duid_ll(duid_bytes),
        interface_id,
        remote_id,
        peer_address: relay.map(|r| r.peer_address),
    })
}

/// `0x` + lowercase hex.
pub fn render_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// ASCII verbatim (control bytes included), anything else as `0x` hex.
pub fn render_opaque(bytes: &[u8]) -> String {
    if bytes.is_ascii() {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        render_hex(bytes)
    }
}

fn render_remote_id(data: &[u8]) -> String {
    match RemoteId::parse(data) {
        Some(remote) => format!(
            "{}:{}",
            remote.enterprise_number,
            render_opaque(remote.remote_id)
        ),
        None => render_hex(data),
    }
}

fn render_duid_ll(duid: &[u8]) -> String {
    match duid_link_layer_address(duid) {
        Some((HARDWARE_TYPE_ETHERNET, address)) => address
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":"),
        Some((_, address)) => render_hex(address),
        None => String::new(),
    }
}
