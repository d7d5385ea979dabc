// Address classification: private vs public

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Private, loopback or link-local addresses are not reachable over the public internet.
/// IPv4-mapped IPv6 addresses are classified as their IPv4 form.
pub fn is_private(ip: IpAddr) -> bool {
    match ip.to_canonical() {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => is_private_v6(v6),
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();
    // 224.0.0.0/24 is link-local multicast
    let link_local_multicast = a == 224 && b == 0 && c == 0;
    ip.is_private() || ip.is_loopback() || ip.is_link_local() || link_local_multicast
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let unique_local = (first & 0xfe00) == 0xfc00;
    let unicast_link_local = (first & 0xffc0) == 0xfe80;
    let link_local_multicast = first == 0xff02;
    unique_local || ip.is_loopback() || unicast_link_local || link_local_multicast
}
