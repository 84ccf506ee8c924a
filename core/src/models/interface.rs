//! Network interface and route records from `--iflist`.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// One network device as reported by the tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    /// Device name, e.g. `eth0`.
    pub name: String,
    /// Short name shown in parentheses; differs from `name` on Windows.
    pub short_name: String,
    /// All addresses of the device, in the order they were listed.
    pub addresses: Vec<InterfaceAddress>,
    pub mac: Option<String>,
    /// `ethernet`, `loopback`, `point2point`, `other`, ...
    pub kind: String,
    pub mtu: u32,
    pub flags: InterfaceFlags,
}

impl InterfaceInfo {
    pub fn has_address(&self, ip: IpAddr) -> bool {
        self.addresses.iter().any(|a| a.ip == ip)
    }

    pub fn ipv4(&self) -> impl Iterator<Item = &InterfaceAddress> {
        self.addresses.iter().filter(|a| a.ip.is_ipv4())
    }

    pub fn ipv6(&self) -> impl Iterator<Item = &InterfaceAddress> {
        self.addresses.iter().filter(|a| a.ip.is_ipv6())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterfaceAddress {
    pub ip: IpAddr,
    pub prefix_len: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterfaceFlags {
    pub up: bool,
    pub loopback: bool,
}

/// One routing table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteInfo {
    pub destination: IpAddr,
    pub prefix_len: u8,
    pub device: String,
    pub metric: u32,
    pub gateway: Option<IpAddr>,
}

impl RouteInfo {
    /// True for `0.0.0.0/0` and `::/0`.
    pub fn is_default(&self) -> bool {
        self.prefix_len == 0 && self.destination.is_unspecified()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_filters() {
        let iface = InterfaceInfo {
            name: "eth0".to_string(),
            short_name: "eth0".to_string(),
            addresses: vec![
                InterfaceAddress {
                    ip: "172.17.0.2".parse().unwrap(),
                    prefix_len: 16,
                },
                InterfaceAddress {
                    ip: "fe80::42:acff:fe11:2".parse().unwrap(),
                    prefix_len: 64,
                },
            ],
            mac: Some("02:42:AC:11:00:02".to_string()),
            kind: "ethernet".to_string(),
            mtu: 1500,
            flags: InterfaceFlags {
                up: true,
                loopback: false,
            },
        };

        assert!(iface.has_address("172.17.0.2".parse().unwrap()));
        assert!(!iface.has_address("10.0.0.1".parse().unwrap()));
        assert_eq!(iface.ipv4().count(), 1);
        assert_eq!(iface.ipv6().count(), 1);
    }

    #[test]
    fn test_default_route() {
        let route = RouteInfo {
            destination: "0.0.0.0".parse().unwrap(),
            prefix_len: 0,
            device: "eth0".to_string(),
            metric: 0,
            gateway: Some("172.17.0.1".parse().unwrap()),
        };
        assert!(route.is_default());
    }
}
