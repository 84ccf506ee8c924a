//! Result model: typed, read-only representation of a completed scan.

mod interface;
mod result;

pub use interface::{InterfaceAddress, InterfaceFlags, InterfaceInfo, RouteInfo};
pub use result::{
    Address, AddressType, ExtraPorts, Host, HostState, HostStatus, Hostname, OsClass, OsMatch,
    Port, PortState, RunInfo, RunStats, ScanInfo, ScanMetadata, ScanResult, Script, Service,
    Uptime,
};
