use std::net::{IpAddr, Ipv4Addr};
use std::ops::Range;
use tokio::net::UdpSocket;

use crate::addrman::PeerAddr;

/// Outbound-facing local IPv4 address.
///
/// A UDP "connect" sends nothing; it only makes the OS pick a route, whose
/// source address we read back. Any failure falls back to loopback.
pub async fn local_ipv4(route_addr: &str) -> Ipv4Addr {
    match route_source(route_addr).await {
        Ok(IpAddr::V4(ip)) if !ip.is_unspecified() => ip,
        Ok(other) => {
            tracing::debug!(addr = %other, "no IPv4 route source, using loopback");
            Ipv4Addr::LOCALHOST
        }
        Err(e) => {
            tracing::debug!(error = %e, route = route_addr, "local route lookup failed, using loopback");
            Ipv4Addr::LOCALHOST
        }
    }
}

async fn route_source(route_addr: &str) -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.connect(route_addr).await?;
    Ok(socket.local_addr()?.ip())
}

/// Every host address of `ip`'s /24 (.1 through .254) on every port in `ports`.
pub fn subnet_targets(ip: Ipv4Addr, ports: Range<u16>) -> Vec<PeerAddr> {
    let [a, b, c, _] = ip.octets();
    (1..=254u8)
        .flat_map(|d| {
            let host = Ipv4Addr::new(a, b, c, d).to_string();
            ports.clone().map(move |port| PeerAddr::new(host.clone(), port))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subnet_targets_cover_prefix() {
        let targets = subnet_targets(Ipv4Addr::new(192, 168, 1, 42), 17000..17010);
        assert_eq!(targets.len(), 254 * 10);
        assert!(targets.contains(&PeerAddr::new("192.168.1.1", 17000)));
        assert!(targets.contains(&PeerAddr::new("192.168.1.254", 17009)));
        assert!(!targets.contains(&PeerAddr::new("192.168.1.0", 17000)));
        assert!(!targets.contains(&PeerAddr::new("192.168.1.255", 17000)));
        assert!(!targets.iter().any(|t| t.port == 17010));
    }

    #[test]
    fn test_empty_port_range() {
        assert!(subnet_targets(Ipv4Addr::new(10, 0, 0, 1), 17000..17000).is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_route_falls_back_to_loopback() {
        assert_eq!(local_ipv4("not an address").await, Ipv4Addr::LOCALHOST);
    }
}
