//! Address range classification for outbound targets.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Why an address is not an acceptable fetch destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressClass {
    /// Public address; fetching is allowed.
    Public,
    /// 127/8 or ::1. Allowed only when loopback is explicitly permitted.
    Loopback,
    /// 10/8, 172.16/12, 192.168/16, or IPv6 unique-local fc00::/7.
    Private,
    /// 169.254/16 or IPv6 fe80::/10.
    LinkLocal,
    /// 0/8 ("this network").
    Unspecified,
}

impl AddressClass {
    /// Whether a target in this class may be fetched.
    pub fn is_allowed(self, allow_loopback: bool) -> bool {
        match self {
            AddressClass::Public => true,
            AddressClass::Loopback => allow_loopback,
            AddressClass::Private | AddressClass::LinkLocal | AddressClass::Unspecified => false,
        }
    }
}

pub fn classify(addr: IpAddr) -> AddressClass {
    match addr {
        IpAddr::V4(v4) => classify_v4(v4),
        IpAddr::V6(v6) => classify_v6(v6),
    }
}

fn classify_v4(addr: Ipv4Addr) -> AddressClass {
    let [a, b, _, _] = addr.octets();
    match (a, b) {
        (127, _) => AddressClass::Loopback,
        (10, _) => AddressClass::Private,
        (172, 16..=31) => AddressClass::Private,
        (192, 168) => AddressClass::Private,
        (169, 254) => AddressClass::LinkLocal,
        (0, _) => AddressClass::Unspecified,
        _ => AddressClass::Public,
    }
}

fn classify_v6(addr: Ipv6Addr) -> AddressClass {
    // ::ffff:a.b.c.d reaches the IPv4 host, so judge it by the embedded address.
    if let Some(v4) = addr.to_ipv4_mapped() {
        return classify_v4(v4);
    }
    if addr.is_loopback() {
        return AddressClass::Loopback;
    }
    let first = addr.segments()[0];
    if first & 0xffc0 == 0xfe80 {
        return AddressClass::LinkLocal;
    }
    if first & 0xfe00 == 0xfc00 {
        return AddressClass::Private;
    }
    AddressClass::Public
}
