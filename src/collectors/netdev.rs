//! Network interface counters from /proc/net/dev, plus the address each
//! interface is reachable on.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;

use nix::ifaddrs::getifaddrs;
use serde::Serialize;

use super::NameFilter;
use crate::error::SourceError;

/// Cumulative traffic counters for a single interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetCounters {
    pub receive_bytes: u64,
    pub receive_packets: u64,
    pub receive_errs: u64,
    pub receive_drop: u64,
    pub transmit_bytes: u64,
    pub transmit_packets: u64,
    pub transmit_errs: u64,
    pub transmit_drop: u64,
}

/// Parses /proc/net/dev into a map of interface name to counters.
///
/// The first two lines are headers. Each following line is
/// "iface: rx_bytes rx_packets rx_errs rx_drop fifo frame compressed multicast tx_bytes ...".
/// The interface name may be glued to the first value ("eth0:123"), so the line is split
/// on the last ':'.
pub fn parse_netdev(
    path: &Path,
    content: &str,
    filter: &NameFilter,
) -> Result<BTreeMap<String, NetCounters>, SourceError> {
    let mut stats = BTreeMap::new();

    for line in content.lines().skip(2) {
        let Some((name, values)) = line.rsplit_once(':') else {
            continue;
        };

        let interface = name.trim();
        if interface.is_empty() || !filter.matches(interface) {
            continue;
        }

        let values: Vec<&str> = values.split_whitespace().collect();
        if values.len() < 16 {
            return Err(SourceError::parse(
                path,
                format!(
                    "interface {}: expected 16 fields, got {}",
                    interface,
                    values.len()
                ),
            ));
        }

        let field = |idx: usize| -> Result<u64, SourceError> {
            values[idx].parse::<u64>().map_err(|e| {
                SourceError::parse(
                    path,
                    format!("interface {}: invalid field '{}': {}", interface, values[idx], e),
                )
            })
        };

        stats.insert(
            interface.to_string(),
            NetCounters {
                receive_bytes: field(0)?,
                receive_packets: field(1)?,
                receive_errs: field(2)?,
                receive_drop: field(3)?,
                transmit_bytes: field(8)?,
                transmit_packets: field(9)?,
                transmit_errs: field(10)?,
                transmit_drop: field(11)?,
            },
        );
    }

    Ok(stats)
}

/// Primary address of every interface that has one, IPv4 first.
pub fn interface_addresses() -> Result<BTreeMap<String, String>, nix::Error> {
    let mut addresses: BTreeMap<String, IpAddr> = BTreeMap::new();

    for ifaddr in getifaddrs()? {
        let Some(address) = ifaddr.address.as_ref() else {
            continue;
        };
        let ip = if let Some(v4) = address.as_sockaddr_in() {
            IpAddr::V4(v4.ip())
        } else if let Some(v6) = address.as_sockaddr_in6() {
            IpAddr::V6(v6.ip())
        } else {
            continue;
        };

        if replaces(addresses.get(&ifaddr.interface_name), ip) {
            addresses.insert(ifaddr.interface_name.clone(), ip);
        }
    }

    Ok(addresses
        .into_iter()
        .map(|(name, ip)| (name, ip.to_string()))
        .collect())
}

/// The first IPv4 address wins; an IPv6 address only fills an empty slot.
fn replaces(current: Option<&IpAddr>, candidate: IpAddr) -> bool {
    match current {
        None => true,
        Some(IpAddr::V4(_)) => false,
        Some(IpAddr::V6(_)) => candidate.is_ipv4(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETDEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 3524288    4120    0    0    0     0          0         0  3524288    4120    0    0    0     0       0          0
  eth0: 987654321 765432   1    2    0     0          0       100 123456789 234567    3    4    0     0       0          0
wlan0:1000 10 0 0 0 0 0 0 2000 20 0 0 0 0 0 0
";

    #[test]
    fn test_parse_netdev() {
        let stats = parse_netdev(Path::new("/proc/net/dev"), NETDEV, &NameFilter::default()).unwrap();
        assert_eq!(stats.len(), 3);

        let eth0 = &stats["eth0"];
        assert_eq!(eth0.receive_bytes, 987654321);
        assert_eq!(eth0.receive_packets, 765432);
        assert_eq!(eth0.receive_errs, 1);
        assert_eq!(eth0.receive_drop, 2);
        assert_eq!(eth0.transmit_bytes, 123456789);
        assert_eq!(eth0.transmit_packets, 234567);
        assert_eq!(eth0.transmit_errs, 3);
        assert_eq!(eth0.transmit_drop, 4);

        assert_eq!(stats["wlan0"].transmit_bytes, 2000);
    }

    #[test]
    fn test_parse_netdev_allow_list() {
        let filter = NameFilter::new("interfaces", &["eth.*".to_string()]).unwrap();
        let stats = parse_netdev(Path::new("net/dev"), NETDEV, &filter).unwrap();
        assert_eq!(stats.keys().collect::<Vec<_>>(), vec!["eth0"]);
    }

    #[test]
    fn test_parse_netdev_truncated_line() {
        let content = "h1\nh2\n  eth0: 1 2 3\n";
        let result = parse_netdev(Path::new("net/dev"), content, &NameFilter::default());
        assert!(matches!(result, Err(SourceError::Parse { .. })));
    }

    #[test]
    fn test_address_preference() {
        let v4: IpAddr = "10.0.0.5".parse().unwrap();
        let v4_other: IpAddr = "10.0.0.6".parse().unwrap();
        let v6: IpAddr = "fe80::1".parse().unwrap();

        assert!(replaces(None, v6));
        assert!(replaces(Some(&v6), v4));
        assert!(!replaces(Some(&v4), v4_other));
        assert!(!replaces(Some(&v4), v6));
        assert!(!replaces(Some(&v6), "fe80::2".parse().unwrap()));
    }

    #[test]
    fn test_loopback_address() {
        let addresses = interface_addresses().unwrap();
        if let Some(lo) = addresses.get("lo") {
            let ip: IpAddr = lo.parse().unwrap();
            assert!(ip.is_loopback(), "lo has {}", lo);
            if ip.is_ipv4() {
                assert_eq!(lo, "127.0.0.1");
            }
        }
    }
}
