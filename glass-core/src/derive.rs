//! Derived display values
//!
//! Each step returns `None` rather than failing, so a chain like
//! "stored DUID -> MAC -> vendor" simply stops at the first gap.

use std::fmt;
use std::net::Ipv6Addr;

const DUID_LLT: u16 = 1;
const DUID_LL: u16 = 3;
const HARDWARE_TYPE_ETHERNET: u16 = 1;

/// Hardware type and link-layer address carried in a DUID-LLT or DUID-LL.
pub fn duid_link_layer_address(duid: &[u8]) -> Option<(u16, &[u8])> {
    let (duid_type, rest) = duid.split_first_chunk::<2>()?;
    let (hardware_type, rest) = rest.split_first_chunk::<2>()?;

    let address = match u16::from_be_bytes(*duid_type) {
        DUID_LLT => rest.get(4..)?,
        DUID_LL => rest,
        _ => return None,
    };

    if address.is_empty() {
        return None;
    }
    Some((u16::from_be_bytes(*hardware_type), address))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub fn oui(&self) -> [u8; 3] {
        [self.0[0], self.0[1], self.0[2]]
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
    }
}

/// MAC address from a stored `0x`-prefixed DUID, Ethernet DUIDs only.
pub fn mac_from_duid(duid: &str) -> Option<MacAddress> {
    let bytes = hex::decode(duid.strip_prefix("0x").unwrap_or(duid)).ok()?;
    match duid_link_layer_address(&bytes)? {
        (HARDWARE_TYPE_ETHERNET, address) => address.try_into().ok().map(MacAddress),
        _ => None,
    }
}

/// MAC embedded in a modified EUI-64 interface identifier.
pub fn mac_from_link_local(address: Ipv6Addr) -> Option<MacAddress> {
    let octets = address.octets();
    let interface_id = &octets[8..];
    if interface_id[3..5] != [0xff, 0xfe] {
        return None;
    }

    let mut mac = [
        interface_id[0],
        interface_id[1],
        interface_id[2],
        interface_id[5],
        interface_id[6],
        interface_id[7],
    ];
    mac[0] ^= 0x02;
    Some(MacAddress(mac))
}

/// OUI registry lookup.
pub trait VendorLookup {
    fn organization(&self, oui: [u8; 3]) -> Option<String>;
}

pub fn vendor_for(mac: Option<MacAddress>, registry: &dyn VendorLookup) -> Option<String> {
    registry.organization(mac?.oui())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StaticRegistry(HashMap<[u8; 3], String>);

    impl VendorLookup for StaticRegistry {
        fn organization(&self, oui: [u8; 3]) -> Option<String> {
            self.0.get(&oui).cloned()
        }
    }

    #[test]
    fn test_duid_llt_skips_time_field() {
        let duid = [0x00, 0x01, 0x00, 0x01, 0x1d, 0x2a, 0x3b, 0x4c, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
        let (hw, address) = duid_link_layer_address(&duid).unwrap();
        assert_eq!(hw, 1);
        assert_eq!(address, &[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    }

    #[test]
    fn test_truncated_duid_has_no_address() {
        assert!(duid_link_layer_address(&[0x00, 0x01, 0x00, 0x01, 0x1d]).is_none());
        assert!(duid_link_layer_address(&[0x00, 0x03, 0x00]).is_none());
        assert!(duid_link_layer_address(&[0x00, 0x03, 0x00, 0x01]).is_none());
    }

    #[test]
    fn test_mac_from_stored_duid() {
        let mac = mac_from_duid("0x00030001001122334455").unwrap();
        assert_eq!(mac.to_string(), "00:11:22:33:44:55");
        assert!(mac_from_duid("0x0002000000090102").is_none());
        assert!(mac_from_duid("not hex").is_none());
    }

    #[test]
    fn test_mac_from_link_local() {
        let mac = mac_from_link_local("fe80::211:22ff:fe33:4455".parse().unwrap()).unwrap();
        assert_eq!(mac.to_string(), "00:11:22:33:44:55");
        assert!(mac_from_link_local("fe80::1".parse().unwrap()).is_none());
    }

    #[test]
    fn test_vendor_chain_stops_at_first_gap() {
        let registry = StaticRegistry(HashMap::from([([0x00, 0x11, 0x22], "Example Corp".to_string())]));
        assert_eq!(
            vendor_for(mac_from_duid("0x00030001001122334455"), &registry).as_deref(),
            Some("Example Corp")
        );
        assert!(vendor_for(mac_from_duid("0x0002"), &registry).is_none());
        assert!(vendor_for(Some(MacAddress([0xaa; 6])), &registry).is_none());
    }
}
