//! nmapkit Core Library
//!
//! Runs the `nmap` binary as a child process and turns its structured output
//! into typed results. Provides functionality to:
//! - Locate nmap and check its version (cached once per process)
//! - Describe scans with composable, validated options
//! - Stream the XML report into the parser while nmap is still running
//! - Cancel or time out a run (SIGTERM, grace period, then SIGKILL)
//! - List network interfaces and routes (`--iflist`)
//! - Persist scanner defaults
//!
//! # Example
//! ```no_run
//! use nmapkit_core::{options, CancelToken, Scanner};
//!
//! # async fn demo() -> nmapkit_core::Result<()> {
//! let scanner = Scanner::new([options::targets(["192.168.1.0/24"]), options::fast_mode()]).await?;
//! let result = scanner.run(&CancelToken::new()).await?;
//! for host in result.up_hosts() {
//!     println!("{:?}: {} open", host.ip(), host.open_ports().count());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod models;
pub mod options;
pub mod parser;
pub mod runner;
pub mod scanner;
pub mod tool;

pub use cancel::CancelToken;
pub use config::{Config, ConfigStore};
pub use error::{Error, Result};
pub use models::{
    Address, AddressType, ExtraPorts, Host, HostState, HostStatus, Hostname, InterfaceAddress,
    InterfaceFlags, InterfaceInfo, OsClass, OsMatch, Port, PortState, RouteInfo, RunInfo,
    RunStats, ScanInfo, ScanMetadata, ScanResult, Script, Service, Uptime,
};
pub use options::{RunnerSettings, ScanConfiguration, ScanFlag, ScanOption, TimingTemplate};
pub use parser::{parse, parse_file, parse_iflist, parse_xml, OutputFormat, ParsedOutput};
pub use runner::{ProcessRunner, RunHandle, RunOutcome};
pub use scanner::{RunState, ScanTask, Scanner, ScannerBuilder};
pub use tool::{ToolInfo, ToolVersion, MINIMUM_VERSION};
