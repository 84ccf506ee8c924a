//! Scan configuration and the option mutators that build it.
//!
//! Every option is a named [`ScanOption`] that either appends to the
//! argument list or adjusts how the tool is run. Options validate their own
//! input when applied; [`ScanConfiguration::validate`] checks the combination.
//!
//! ```no_run
//! use nmapkit_core::{options, Scanner};
//!
//! # async fn demo() -> nmapkit_core::Result<()> {
//! let scanner = Scanner::new([
//!     options::targets(["scanme.nmap.org"]),
//!     options::ports("22,80,443"),
//!     options::service_detection(),
//! ])
//! .await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::OutputFormat;
use crate::scanner::ScannerBuilder;

/// Grace period between SIGTERM and SIGKILL when none is configured.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// TCP scan techniques; nmap accepts at most one per run.
const TCP_SCAN_TYPES: &[&str] = &["-sS", "-sT", "-sA", "-sF", "-sN", "-sX"];

const TIMING_FLAGS: &[&str] = &["-T0", "-T1", "-T2", "-T3", "-T4", "-T5"];

/// Flags that would change the output the parser relies on.
const RESERVED_FLAGS: &[&str] = &[
    "-oX", "-oN", "-oG", "-oA", "-oS", "-oM", "--iflist", "--resume", "--stylesheet",
];

// ============================================================================
// ScanConfiguration
// ============================================================================

/// One command-line flag with its optional value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanFlag {
    pub flag: String,
    pub value: Option<String>,
}

/// What to scan and how the tool is asked to report it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfiguration {
    /// Target specifications in the order given.
    pub targets: Vec<String>,
    /// Flags in the order they were applied.
    pub flags: Vec<ScanFlag>,
    pub output: OutputFormat,
}

impl ScanConfiguration {
    /// The argument vector passed to the tool (binary not included).
    pub fn args(&self) -> Vec<String> {
        if self.output == OutputFormat::InterfaceList {
            return vec!["--iflist".to_string()];
        }

        let mut args = Vec::with_capacity(self.flags.len() * 2 + self.targets.len() + 2);
        for flag in &self.flags {
            args.push(flag.flag.clone());
            if let Some(value) = &flag.value {
                args.push(value.clone());
            }
        }
        args.extend(self.targets.iter().cloned());
        args.push("-oX".to_string());
        args.push("-".to_string());
        args
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f.flag == flag)
    }

    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.flags
            .iter()
            .find(|f| f.flag == flag)
            .and_then(|f| f.value.as_deref())
    }

    /// Append a flag. Re-adding an identical flag is a no-op; re-adding it
    /// with a different value is a conflict.
    pub(crate) fn push_flag(&mut self, flag: &str, value: Option<String>) -> Result<()> {
        if let Some(existing) = self.flags.iter().find(|f| f.flag == flag) {
            if existing.value == value {
                return Ok(());
            }
            return Err(Error::InvalidConfiguration(format!(
                "{} given twice with different values ({:?} and {:?})",
                flag, existing.value, value
            )));
        }
        self.flags.push(ScanFlag {
            flag: flag.to_string(),
            value,
        });
        Ok(())
    }

    /// Check that the options form a runnable combination.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfiguration(msg));

        if self.output == OutputFormat::InterfaceList {
            if !self.targets.is_empty() || !self.flags.is_empty() {
                return invalid(
                    "interface listing takes no targets or scan flags".to_string(),
                );
            }
            return Ok(());
        }

        if self.targets.is_empty() && !self.has_flag("-iL") {
            return invalid("no targets given".to_string());
        }

        let port_flags: Vec<&str> = ["-p", "--top-ports", "-F"]
            .into_iter()
            .filter(|f| self.has_flag(f))
            .collect();
        if port_flags.len() > 1 {
            return invalid(format!("{} cannot be combined", port_flags.join(" and ")));
        }

        for no_ports in ["-sn", "-sL"] {
            if self.has_flag(no_ports) {
                if let Some(port_flag) = port_flags.first() {
                    return invalid(format!("{} does not scan ports, drop {}", no_ports, port_flag));
                }
            }
        }
        if self.has_flag("-sn") && self.has_flag("-sL") {
            return invalid("-sn and -sL cannot be combined".to_string());
        }

        for (group, what) in [
            (TCP_SCAN_TYPES, "TCP scan type"),
            (TIMING_FLAGS, "timing template"),
        ] {
            let present: Vec<&str> = group.iter().copied().filter(|f| self.has_flag(f)).collect();
            if present.len() > 1 {
                return invalid(format!("only one {} allowed, got {}", what, present.join(", ")));
            }
        }

        if let Some(reserved) = self
            .flags
            .iter()
            .find(|f| RESERVED_FLAGS.contains(&f.flag.as_str()))
        {
            return invalid(format!("{} is managed by the scanner", reserved.flag));
        }

        Ok(())
    }
}

// ============================================================================
// Runtime settings
// ============================================================================

/// How the tool process is run. Not part of the argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Explicit binary; `None` means discover it.
    pub binary: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub grace_period: Duration,
    pub timeout: Option<Duration>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            binary: None,
            working_dir: None,
            env: Vec::new(),
            grace_period: DEFAULT_GRACE_PERIOD,
            timeout: None,
        }
    }
}

// ============================================================================
// ScanOption
// ============================================================================

type Mutator = Box<dyn FnOnce(&mut ScannerBuilder) -> Result<()> + Send>;

/// A named configuration mutator.
pub struct ScanOption {
    name: &'static str,
    apply: Mutator,
}

impl ScanOption {
    pub fn new<F>(name: &'static str, apply: F) -> Self
    where
        F: FnOnce(&mut ScannerBuilder) -> Result<()> + Send + 'static,
    {
        Self {
            name,
            apply: Box::new(apply),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Apply this option to `builder`, prefixing failures with the option name.
    pub fn apply(self, builder: &mut ScannerBuilder) -> Result<()> {
        let Self { name, apply } = self;
        apply(builder).map_err(|e| match e {
            Error::InvalidConfiguration(msg) => {
                Error::InvalidConfiguration(format!("{}: {}", name, msg))
            }
            other => other,
        })
    }

    fn flag(name: &'static str, flag: &'static str) -> Self {
        Self::new(name, move |b| b.config.push_flag(flag, None))
    }

    fn flag_value(name: &'static str, flag: &'static str, value: String) -> Self {
        Self::new(name, move |b| b.config.push_flag(flag, Some(value)))
    }

    /// An option that fails when applied.
    fn rejected(name: &'static str, reason: String) -> Self {
        Self::new(name, move |_| Err(Error::InvalidConfiguration(reason)))
    }
}

impl fmt::Debug for ScanOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanOption").field("name", &self.name).finish()
    }
}

/// nmap's `-T` timing templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimingTemplate {
    Paranoid,
    Sneaky,
    Polite,
    Normal,
    Aggressive,
    Insane,
}

impl TimingTemplate {
    fn flag(self) -> &'static str {
        TIMING_FLAGS[self.level() as usize]
    }

    pub fn level(self) -> u8 {
        match self {
            TimingTemplate::Paranoid => 0,
            TimingTemplate::Sneaky => 1,
            TimingTemplate::Polite => 2,
            TimingTemplate::Normal => 3,
            TimingTemplate::Aggressive => 4,
            TimingTemplate::Insane => 5,
        }
    }

    pub fn from_level(level: u8) -> Option<Self> {
        Some(match level {
            0 => TimingTemplate::Paranoid,
            1 => TimingTemplate::Sneaky,
            2 => TimingTemplate::Polite,
            3 => TimingTemplate::Normal,
            4 => TimingTemplate::Aggressive,
            5 => TimingTemplate::Insane,
            _ => return None,
        })
    }
}

// ============================================================================
// Targets
// ============================================================================

/// Hosts, networks or ranges to scan, e.g. `10.0.0.0/24`, `192.168.1.1-20`.
pub fn targets<I, S>(targets: I) -> ScanOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let targets: Vec<String> = targets.into_iter().map(Into::into).collect();
    ScanOption::new("targets", move |b| {
        if targets.is_empty() {
            return Err(Error::InvalidConfiguration("empty target list".to_string()));
        }
        for target in targets {
            check_word(&target, "target")?;
            if !b.config.targets.contains(&target) {
                b.config.targets.push(target);
            }
        }
        Ok(())
    })
}

/// Read targets from a file (`-iL`).
pub fn target_file(path: impl Into<PathBuf>) -> ScanOption {
    let path = path.into();
    ScanOption::new("target_file", move |b| {
        if !path.is_file() {
            return Err(Error::InvalidConfiguration(format!(
                "{} is not a readable file",
                path.display()
            )));
        }
        b.config
            .push_flag("-iL", Some(path.to_string_lossy().into_owned()))
    })
}

/// Hosts or networks to leave out (`--exclude`).
pub fn exclude<I, S>(hosts: I) -> ScanOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let hosts: Vec<String> = hosts.into_iter().map(Into::into).collect();
    ScanOption::new("exclude", move |b| {
        for host in &hosts {
            check_word(host, "excluded host")?;
        }
        if hosts.is_empty() {
            return Err(Error::InvalidConfiguration("empty exclude list".to_string()));
        }
        b.config.push_flag("--exclude", Some(hosts.join(",")))
    })
}

// ============================================================================
// Port selection
// ============================================================================

/// Port list in nmap syntax (`-p`), e.g. `22,80,1000-2000` or `U:53,T:443`.
pub fn ports(spec: impl Into<String>) -> ScanOption {
    let spec = spec.into();
    match validate_port_spec(&spec) {
        Ok(()) => ScanOption::flag_value("ports", "-p", spec),
        Err(reason) => ScanOption::rejected("ports", reason),
    }
}

/// Scan the `n` most common ports (`--top-ports`).
pub fn top_ports(n: u32) -> ScanOption {
    if n == 0 || n > 65535 {
        return ScanOption::rejected("top_ports", format!("{} is not in 1..=65535", n));
    }
    ScanOption::flag_value("top_ports", "--top-ports", n.to_string())
}

/// Scan fewer ports than the default (`-F`).
pub fn fast_mode() -> ScanOption {
    ScanOption::flag("fast_mode", "-F")
}

// ============================================================================
// Host discovery
// ============================================================================

/// Host discovery only, no port scan (`-sn`).
pub fn ping_scan() -> ScanOption {
    ScanOption::flag("ping_scan", "-sn")
}

/// List targets without sending packets (`-sL`).
pub fn list_scan() -> ScanOption {
    ScanOption::flag("list_scan", "-sL")
}

/// Treat every host as up (`-Pn`).
pub fn skip_host_discovery() -> ScanOption {
    ScanOption::flag("skip_host_discovery", "-Pn")
}

/// Never resolve names (`-n`).
pub fn no_dns() -> ScanOption {
    ScanOption::flag("no_dns", "-n")
}

// ============================================================================
// Scan techniques
// ============================================================================

pub fn syn_scan() -> ScanOption {
    ScanOption::flag("syn_scan", "-sS")
}

pub fn connect_scan() -> ScanOption {
    ScanOption::flag("connect_scan", "-sT")
}

pub fn ack_scan() -> ScanOption {
    ScanOption::flag("ack_scan", "-sA")
}

pub fn fin_scan() -> ScanOption {
    ScanOption::flag("fin_scan", "-sF")
}

pub fn null_scan() -> ScanOption {
    ScanOption::flag("null_scan", "-sN")
}

pub fn xmas_scan() -> ScanOption {
    ScanOption::flag("xmas_scan", "-sX")
}

pub fn udp_scan() -> ScanOption {
    ScanOption::flag("udp_scan", "-sU")
}

// ============================================================================
// Detection
// ============================================================================

/// Probe open ports for service and version (`-sV`).
pub fn service_detection() -> ScanOption {
    ScanOption::flag("service_detection", "-sV")
}

/// OS fingerprinting (`-O`).
pub fn os_detection() -> ScanOption {
    ScanOption::flag("os_detection", "-O")
}

/// NSE scripts or categories (`--script`).
pub fn scripts<I, S>(scripts: I) -> ScanOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let scripts: Vec<String> = scripts.into_iter().map(Into::into).collect();
    ScanOption::new("scripts", move |b| {
        if scripts.is_empty() {
            return Err(Error::InvalidConfiguration("empty script list".to_string()));
        }
        for script in &scripts {
            check_word(script, "script")?;
        }
        b.config.push_flag("--script", Some(scripts.join(",")))
    })
}

/// Arguments for NSE scripts (`--script-args`).
pub fn script_args<I, K, V>(args: I) -> ScanOption
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let args: Vec<(String, String)> = args
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    ScanOption::new("script_args", move |b| {
        if args.is_empty() {
            return Err(Error::InvalidConfiguration("no script arguments".to_string()));
        }
        let mut rendered = Vec::with_capacity(args.len());
        for (key, value) in &args {
            if key.is_empty() || key.contains(['=', ',']) {
                return Err(Error::InvalidConfiguration(format!(
                    "invalid script argument name {:?}",
                    key
                )));
            }
            rendered.push(format!("{}={}", key, value));
        }
        b.config.push_flag("--script-args", Some(rendered.join(",")))
    })
}

// ============================================================================
// Performance
// ============================================================================

pub fn timing(template: TimingTemplate) -> ScanOption {
    ScanOption::flag("timing", template.flag())
}

/// Send at least `packets_per_second` probes (`--min-rate`).
pub fn min_rate(packets_per_second: u32) -> ScanOption {
    if packets_per_second == 0 {
        return ScanOption::rejected("min_rate", "rate must be positive".to_string());
    }
    ScanOption::flag_value("min_rate", "--min-rate", packets_per_second.to_string())
}

pub fn max_retries(retries: u32) -> ScanOption {
    ScanOption::flag_value("max_retries", "--max-retries", retries.to_string())
}

/// Give up on a host after `limit` (`--host-timeout`).
pub fn host_timeout(limit: Duration) -> ScanOption {
    if limit.as_millis() == 0 {
        return ScanOption::rejected("host_timeout", "timeout must be at least 1ms".to_string());
    }
    ScanOption::flag_value("host_timeout", "--host-timeout", format!("{}ms", limit.as_millis()))
}

// ============================================================================
// Misc
// ============================================================================

/// Only report open (or possibly open) ports (`--open`).
pub fn open_only() -> ScanOption {
    ScanOption::flag("open_only", "--open")
}

/// Record why each port is in its state (`--reason`).
pub fn reason() -> ScanOption {
    ScanOption::flag("reason", "--reason")
}

pub fn ipv6() -> ScanOption {
    ScanOption::flag("ipv6", "-6")
}

/// Send packets through a specific interface (`-e`).
pub fn network_interface(name: impl Into<String>) -> ScanOption {
    let name = name.into();
    ScanOption::new("network_interface", move |b| {
        check_word(&name, "interface name")?;
        b.config.push_flag("-e", Some(name))
    })
}

/// Raw arguments passed through unchanged.
///
/// Output-format flags are refused because the scanner owns the output.
pub fn custom_args<I, S>(args: I) -> ScanOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    ScanOption::new("custom_args", move |b| {
        for arg in args {
            if arg.is_empty() {
                return Err(Error::InvalidConfiguration("empty argument".to_string()));
            }
            if RESERVED_FLAGS.iter().any(|r| arg.starts_with(r)) {
                return Err(Error::InvalidConfiguration(format!(
                    "{} is managed by the scanner",
                    arg
                )));
            }
            b.config.flags.push(ScanFlag {
                flag: arg,
                value: None,
            });
        }
        Ok(())
    })
}

// ============================================================================
// Runtime behavior
// ============================================================================

/// Run this binary instead of discovering one. A bare name is looked up
/// on `PATH`.
pub fn binary_path(path: impl Into<PathBuf>) -> ScanOption {
    let path = path.into();
    ScanOption::new("binary_path", move |b| {
        if path.as_os_str().is_empty() {
            return Err(Error::InvalidConfiguration("empty path".to_string()));
        }
        b.runner.binary = Some(path);
        Ok(())
    })
}

pub fn working_dir(path: impl Into<PathBuf>) -> ScanOption {
    let path = path.into();
    ScanOption::new("working_dir", move |b| {
        if !path.is_dir() {
            return Err(Error::InvalidConfiguration(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        b.runner.working_dir = Some(path);
        Ok(())
    })
}

/// Extra environment variable for the tool process.
pub fn env(key: impl Into<String>, value: impl Into<String>) -> ScanOption {
    let (key, value) = (key.into(), value.into());
    ScanOption::new("env", move |b| {
        if key.is_empty() || key.contains(['=', '\0']) || value.contains('\0') {
            return Err(Error::InvalidConfiguration(format!(
                "invalid environment variable {:?}",
                key
            )));
        }
        b.runner.env.retain(|(k, _)| k != &key);
        b.runner.env.push((key, value));
        Ok(())
    })
}

/// Time between SIGTERM and SIGKILL on cancellation or timeout.
pub fn grace_period(period: Duration) -> ScanOption {
    ScanOption::new("grace_period", move |b| {
        if period.is_zero() {
            return Err(Error::InvalidConfiguration(
                "grace period must be positive".to_string(),
            ));
        }
        b.runner.grace_period = period;
        Ok(())
    })
}

/// Upper bound on the whole run.
pub fn timeout(limit: Duration) -> ScanOption {
    ScanOption::new("timeout", move |b| {
        if limit.is_zero() {
            return Err(Error::InvalidConfiguration(
                "timeout must be positive".to_string(),
            ));
        }
        b.runner.timeout = Some(limit);
        Ok(())
    })
}

/// List interfaces and routes (`--iflist`) instead of scanning.
pub fn interface_listing() -> ScanOption {
    ScanOption::new("interface_listing", |b| {
        b.config.output = OutputFormat::InterfaceList;
        Ok(())
    })
}

// ============================================================================
// Validation helpers
// ============================================================================

/// Reject values that are empty, contain whitespace, or look like flags.
fn check_word(value: &str, what: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidConfiguration(format!("empty {}", what)));
    }
    if value.starts_with('-') {
        return Err(Error::InvalidConfiguration(format!(
            "{} {:?} looks like a flag",
            what, value
        )));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidConfiguration(format!(
            "{} {:?} contains whitespace",
            what, value
        )));
    }
    Ok(())
}

/// Check an nmap port specification.
///
/// Accepts comma-separated items, each optionally prefixed with `T:`, `U:`,
/// `S:` or `P:`, where an item is a port, a range (`a-b`, `a-`, `-b`, `-`),
/// or a service name (wildcards allowed).
pub fn validate_port_spec(spec: &str) -> std::result::Result<(), String> {
    if spec.trim().is_empty() {
        return Err("empty port specification".to_string());
    }

    for raw in spec.split(',') {
        let item = match raw.split_once(':') {
            Some((proto, rest)) if matches!(proto, "T" | "U" | "S" | "P") => rest,
            Some(_) => return Err(format!("unknown protocol prefix in {:?}", raw)),
            None => raw,
        };
        if item.is_empty() {
            return Err(format!("empty item in {:?}", spec));
        }

        if item.starts_with(|c: char| c.is_ascii_alphabetic() || c == '*' || c == '?') {
            if !item
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '*' | '?' | '.'))
            {
                return Err(format!("invalid service name {:?}", item));
            }
            continue;
        }

        match item.split_once('-') {
            None => {
                parse_port(item)?;
            }
            Some((low, high)) => {
                let low = if low.is_empty() { 0 } else { parse_port(low)? };
                let high = if high.is_empty() { 65535 } else { parse_port(high)? };
                if low > high {
                    return Err(format!("descending range {:?}", item));
                }
            }
        }
    }
    Ok(())
}

fn parse_port(value: &str) -> std::result::Result<u16, String> {
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("invalid port {:?}", value));
    }
    value
        .parse::<u16>()
        .map_err(|_| format!("port {} out of range 0-65535", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_all(options: Vec<ScanOption>) -> Result<ScannerBuilder> {
        let mut builder = ScannerBuilder::new();
        for option in options {
            option.apply(&mut builder)?;
        }
        builder.configuration().validate()?;
        Ok(builder)
    }

    fn invalid(options: Vec<ScanOption>) -> String {
        match apply_all(options) {
            Err(Error::InvalidConfiguration(msg)) => msg,
            other => panic!("expected invalid configuration, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_args_in_application_order() {
        let builder = apply_all(vec![
            syn_scan(),
            ports("22,80"),
            targets(["10.0.0.1", "10.0.0.0/30"]),
            service_detection(),
            timing(TimingTemplate::Aggressive),
        ])
        .unwrap();

        assert_eq!(
            builder.configuration().args(),
            vec!["-sS", "-p", "22,80", "-sV", "-T4", "10.0.0.1", "10.0.0.0/30", "-oX", "-"]
        );
    }

    #[test]
    fn test_each_option_in_isolation() {
        let mut builder = ScannerBuilder::new();
        host_timeout(Duration::from_secs(30)).apply(&mut builder).unwrap();
        assert_eq!(builder.configuration().flag_value("--host-timeout"), Some("30000ms"));

        script_args([("http.useragent", "probe")]).apply(&mut builder).unwrap();
        assert_eq!(
            builder.configuration().flag_value("--script-args"),
            Some("http.useragent=probe")
        );

        grace_period(Duration::from_millis(250)).apply(&mut builder).unwrap();
        assert_eq!(builder.settings().grace_period, Duration::from_millis(250));

        env("NMAPDIR", "/tmp/a").apply(&mut builder).unwrap();
        env("NMAPDIR", "/tmp/b").apply(&mut builder).unwrap();
        assert_eq!(
            builder.settings().env,
            vec![("NMAPDIR".to_string(), "/tmp/b".to_string())]
        );
    }

    #[test]
    fn test_repeated_identical_option_is_idempotent() {
        let builder = apply_all(vec![
            targets(["a.example"]),
            targets(["a.example", "b.example"]),
            service_detection(),
            service_detection(),
        ])
        .unwrap();
        let config = builder.configuration();
        assert_eq!(config.targets, vec!["a.example", "b.example"]);
        assert_eq!(config.flags.len(), 1);
    }

    #[test]
    fn test_option_errors_name_the_option() {
        let msg = invalid(vec![targets(["a"]), ports("22,99999")]);
        assert!(msg.starts_with("ports:"), "{msg}");

        let msg = invalid(vec![targets(["-oN /tmp/x"])]);
        assert!(msg.starts_with("targets:"), "{msg}");

        let msg = invalid(vec![targets(["a"]), grace_period(Duration::ZERO)]);
        assert!(msg.starts_with("grace_period:"), "{msg}");
    }

    #[test]
    fn test_conflicts() {
        invalid(vec![ports("22")]);
        invalid(vec![targets(["a"]), ports("22"), top_ports(100)]);
        invalid(vec![targets(["a"]), fast_mode(), ports("80")]);
        invalid(vec![targets(["a"]), ping_scan(), ports("80")]);
        invalid(vec![targets(["a"]), ping_scan(), list_scan()]);
        invalid(vec![targets(["a"]), syn_scan(), connect_scan()]);
        invalid(vec![
            targets(["a"]),
            timing(TimingTemplate::Polite),
            timing(TimingTemplate::Insane),
        ]);
        invalid(vec![targets(["a"]), ports("22"), ports("80")]);
        invalid(vec![targets(["a"]), interface_listing()]);
        invalid(vec![targets(["a"]), custom_args(["-oN"])]);

        // UDP combines with a TCP technique.
        apply_all(vec![targets(["a"]), syn_scan(), udp_scan()]).unwrap();
    }

    #[test]
    fn test_interface_listing_args() {
        let builder = apply_all(vec![interface_listing()]).unwrap();
        assert_eq!(builder.configuration().args(), vec!["--iflist"]);
    }

    #[test]
    fn test_port_spec_validation() {
        for ok in [
            "22",
            "22,80,443",
            "1-1024",
            "-",
            "1024-",
            "-100",
            "U:53,T:80-90",
            "http*",
            "ssh,0",
        ] {
            assert!(validate_port_spec(ok).is_ok(), "{ok}");
        }
        for bad in ["", "65536", "80-22", "22,,80", "X:80", "22;80", "1e3", "80-90-100"] {
            assert!(validate_port_spec(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_timing_levels() {
        for level in 0..=5 {
            let template = TimingTemplate::from_level(level).unwrap();
            assert_eq!(template.level(), level);
        }
        assert!(TimingTemplate::from_level(6).is_none());
        assert_eq!(TimingTemplate::Normal.flag(), "-T3");
    }
}
