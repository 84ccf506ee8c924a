//! Scan result tree and its lookups.

use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::interface::{InterfaceInfo, RouteInfo};

// ============================================================================
// ScanResult
// ============================================================================

/// A completed scan.
///
/// Only ever produced from output that parsed completely; a failed or
/// interrupted run yields an error instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub metadata: ScanMetadata,
    #[serde(default)]
    pub scan_info: Vec<ScanInfo>,
    #[serde(default)]
    pub hosts: Vec<Host>,
    /// Present for XML runs; interface listings carry no run statistics.
    pub stats: Option<RunStats>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceInfo>,
    #[serde(default)]
    pub routes: Vec<RouteInfo>,
}

impl ScanResult {
    /// Find a host by any of its addresses (IPv4, IPv6 or MAC).
    pub fn host(&self, address: &str) -> Option<&Host> {
        self.hosts.iter().find(|h| h.has_address(address))
    }

    /// Find a host by reverse-DNS or user-supplied hostname.
    pub fn host_by_name(&self, name: &str) -> Option<&Host> {
        self.hosts
            .iter()
            .find(|h| h.hostnames.iter().any(|n| n.name.eq_ignore_ascii_case(name)))
    }

    /// Hosts reported as up.
    pub fn up_hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.iter().filter(|h| h.status.state == HostState::Up)
    }

    /// Hosts with the given port open on any protocol.
    pub fn hosts_with_open_port(&self, port: u16) -> impl Iterator<Item = &Host> {
        self.hosts
            .iter()
            .filter(move |h| h.port(port).map(Port::is_open).unwrap_or(false))
    }

    /// Find an interface by device name or short name.
    pub fn interface(&self, name: &str) -> Option<&InterfaceInfo> {
        self.interfaces
            .iter()
            .find(|i| i.name == name || i.short_name == name)
    }

    /// Routes leaving through the given device.
    pub fn routes_via<'a>(&'a self, device: &'a str) -> impl Iterator<Item = &'a RouteInfo> {
        self.routes.iter().filter(move |r| r.device == device)
    }
}

/// Facts about the run itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanMetadata {
    /// Full argument vector, binary first.
    pub command_line: Vec<String>,
    /// Wall clock at spawn, unix seconds.
    pub started_at: u64,
    /// Wall clock at exit, unix seconds.
    pub finished_at: u64,
    /// Exit code of the tool; `None` if it was killed by a signal.
    pub exit_code: Option<i32>,
    /// Attributes of the `<nmaprun>` element, absent for interface listings.
    pub run: Option<RunInfo>,
}

impl ScanMetadata {
    /// Wall-clock duration of the run.
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.finished_at.saturating_sub(self.started_at))
    }
}

/// Attributes the tool records about its own invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub scanner: String,
    pub args: Option<String>,
    pub version: Option<String>,
    pub xml_output_version: Option<String>,
    /// Scan start reported by the tool, unix seconds.
    pub start: Option<u64>,
    pub start_str: Option<String>,
}

/// One `<scaninfo>` entry: which scan type ran against which ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanInfo {
    pub scan_type: String,
    pub protocol: String,
    pub num_services: u32,
    pub services: String,
}

// ============================================================================
// Host
// ============================================================================

/// One scanned target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
    pub status: HostStatus,
    #[serde(default)]
    pub addresses: Vec<Address>,
    #[serde(default)]
    pub hostnames: Vec<Hostname>,
    #[serde(default)]
    pub ports: Vec<Port>,
    #[serde(default)]
    pub extra_ports: Vec<ExtraPorts>,
    #[serde(default)]
    pub os_matches: Vec<OsMatch>,
    pub uptime: Option<Uptime>,
    pub distance: Option<u32>,
    #[serde(default)]
    pub scripts: Vec<Script>,
}

impl Host {
    pub fn has_address(&self, address: &str) -> bool {
        self.addresses
            .iter()
            .any(|a| a.addr.eq_ignore_ascii_case(address))
    }

    /// First IP address of the host, if any parses.
    pub fn ip(&self) -> Option<IpAddr> {
        self.addresses
            .iter()
            .filter(|a| a.addr_type != AddressType::Mac)
            .find_map(|a| a.addr.parse().ok())
    }

    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.addresses
            .iter()
            .filter(|a| a.addr_type == AddressType::Ipv4)
            .find_map(|a| a.addr.parse().ok())
    }

    pub fn mac(&self) -> Option<&Address> {
        self.addresses
            .iter()
            .find(|a| a.addr_type == AddressType::Mac)
    }

    /// Find a port by number, regardless of protocol.
    pub fn port(&self, number: u16) -> Option<&Port> {
        self.ports.iter().find(|p| p.number == number)
    }

    pub fn port_with_protocol(&self, number: u16, protocol: &str) -> Option<&Port> {
        self.ports
            .iter()
            .find(|p| p.number == number && p.protocol.eq_ignore_ascii_case(protocol))
    }

    pub fn open_ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(|p| p.is_open())
    }

    /// Best OS guess by accuracy.
    pub fn best_os_match(&self) -> Option<&OsMatch> {
        self.os_matches.iter().max_by_key(|m| m.accuracy)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostState {
    Up,
    Down,
    Skipped,
    #[default]
    Unknown,
}

impl HostState {
    pub fn parse(value: &str) -> Self {
        match value {
            "up" => HostState::Up,
            "down" => HostState::Down,
            "skipped" => HostState::Skipped,
            _ => HostState::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStatus {
    pub state: HostState,
    pub reason: String,
    pub reason_ttl: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    Ipv4,
    Ipv6,
    Mac,
}

impl AddressType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ipv4" => Some(AddressType::Ipv4),
            "ipv6" => Some(AddressType::Ipv6),
            "mac" => Some(AddressType::Mac),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub addr: String,
    pub addr_type: AddressType,
    /// NIC vendor, only for MAC addresses.
    pub vendor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hostname {
    pub name: String,
    /// `user` or `PTR`.
    pub kind: Option<String>,
}

// ============================================================================
// Ports and services
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    /// `tcp`, `udp`, `sctp` or `ip`.
    pub protocol: String,
    pub number: u16,
    pub state: PortState,
    pub service: Option<Service>,
    #[serde(default)]
    pub scripts: Vec<Script>,
}

impl Port {
    pub fn is_open(&self) -> bool {
        self.state.state == "open"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortState {
    /// `open`, `closed`, `filtered`, `open|filtered`, ...
    pub state: String,
    pub reason: String,
    pub reason_ttl: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub product: Option<String>,
    pub version: Option<String>,
    pub extra_info: Option<String>,
    pub os_type: Option<String>,
    pub hostname: Option<String>,
    pub tunnel: Option<String>,
    /// `table` or `probed`.
    pub method: Option<String>,
    /// Detection confidence, 0 to 10.
    pub confidence: Option<u8>,
    #[serde(default)]
    pub cpes: Vec<String>,
}

/// Summary line for ports not listed individually.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraPorts {
    pub state: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub id: String,
    pub output: String,
}

// ============================================================================
// OS detection
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsMatch {
    pub name: String,
    /// Percentage, 0 to 100.
    pub accuracy: u8,
    #[serde(default)]
    pub classes: Vec<OsClass>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsClass {
    pub kind: Option<String>,
    pub vendor: Option<String>,
    pub family: Option<String>,
    pub generation: Option<String>,
    pub accuracy: u8,
    #[serde(default)]
    pub cpes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uptime {
    pub seconds: u64,
    pub last_boot: Option<String>,
}

// ============================================================================
// Run statistics
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Finish time, unix seconds.
    pub finished: u64,
    pub finished_str: Option<String>,
    /// Elapsed seconds as reported by the tool.
    pub elapsed: f64,
    pub summary: Option<String>,
    /// `success` or `error`.
    pub exit: Option<String>,
    pub error_msg: Option<String>,
    pub hosts_up: u32,
    pub hosts_down: u32,
    pub hosts_total: u32,
}

impl RunStats {
    pub fn finished_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(number: u16, protocol: &str, state: &str) -> Port {
        Port {
            protocol: protocol.to_string(),
            number,
            state: PortState {
                state: state.to_string(),
                reason: "syn-ack".to_string(),
                reason_ttl: Some(64),
            },
            service: None,
            scripts: Vec::new(),
        }
    }

    fn host(addr: &str, state: HostState, ports: Vec<Port>) -> Host {
        Host {
            status: HostStatus {
                state,
                reason: "echo-reply".to_string(),
                reason_ttl: None,
            },
            addresses: vec![
                Address {
                    addr: addr.to_string(),
                    addr_type: AddressType::Ipv4,
                    vendor: None,
                },
                Address {
                    addr: "02:42:AC:11:00:02".to_string(),
                    addr_type: AddressType::Mac,
                    vendor: Some("Docker".to_string()),
                },
            ],
            hostnames: vec![Hostname {
                name: format!("host-{}", addr),
                kind: Some("PTR".to_string()),
            }],
            ports,
            ..Default::default()
        }
    }

    fn result() -> ScanResult {
        ScanResult {
            metadata: ScanMetadata {
                command_line: vec!["nmap".into(), "-oX".into(), "-".into()],
                started_at: 100,
                finished_at: 107,
                exit_code: Some(0),
                run: None,
            },
            scan_info: Vec::new(),
            hosts: vec![
                host(
                    "10.0.0.1",
                    HostState::Up,
                    vec![port(22, "tcp", "open"), port(53, "udp", "open|filtered")],
                ),
                host("10.0.0.2", HostState::Down, Vec::new()),
            ],
            stats: None,
            interfaces: Vec::new(),
            routes: Vec::new(),
        }
    }

    #[test]
    fn test_host_lookup() {
        let result = result();
        assert!(result.host("10.0.0.1").is_some());
        assert!(result.host("02:42:ac:11:00:02").is_some());
        assert!(result.host("10.9.9.9").is_none());
        assert!(result.host_by_name("HOST-10.0.0.2").is_some());
        assert!(result.host_by_name("missing").is_none());
        assert_eq!(result.up_hosts().count(), 1);
    }

    #[test]
    fn test_port_lookup() {
        let result = result();
        let host = result.host("10.0.0.1").unwrap();

        assert!(host.port(22).unwrap().is_open());
        assert!(host.port_with_protocol(53, "UDP").is_some());
        assert!(host.port_with_protocol(53, "tcp").is_none());
        assert!(host.port(443).is_none());
        assert_eq!(host.open_ports().count(), 1);

        assert_eq!(result.hosts_with_open_port(22).count(), 1);
        assert_eq!(result.hosts_with_open_port(8080).count(), 0);
    }

    #[test]
    fn test_missing_interface_is_none() {
        let result = result();
        assert!(result.interface("eth0").is_none());
        assert_eq!(result.routes_via("eth0").count(), 0);
    }

    #[test]
    fn test_host_addresses() {
        let result = result();
        let host = result.host("10.0.0.1").unwrap();
        assert_eq!(host.ip(), Some("10.0.0.1".parse().unwrap()));
        assert_eq!(host.ipv4(), Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(host.mac().unwrap().vendor.as_deref(), Some("Docker"));
        assert!(host.best_os_match().is_none());
        assert_eq!(result.metadata.duration(), Duration::from_secs(7));
    }
}
