//! Parser for the interface and route tables printed by `--iflist`.
//!
//! Expected output format:
//! ```text
//! Starting Nmap 7.94 ( https://nmap.org ) at 2024-05-01 10:00 UTC
//! ************************INTERFACES************************
//! DEV  (SHORT) IP/MASK                     TYPE     UP MTU   MAC
//! lo   (lo)    127.0.0.1/8                 loopback up 65536
//! eth0 (eth0)  172.17.0.2/16               ethernet up 1500  02:42:AC:11:00:02
//!
//! **************************ROUTES**************************
//! DST/MASK                      DEV  METRIC GATEWAY
//! 172.17.0.0/16                 eth0 0
//! 0.0.0.0/0                     eth0 0      172.17.0.1
//! ```

use std::net::IpAddr;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use super::ParsedOutput;
use crate::error::{Error, Result};
use crate::models::{InterfaceAddress, InterfaceFlags, InterfaceInfo, RouteInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Interfaces,
    Routes,
}

fn interface_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(\S+)\s+\(([^)]*)\)\s+(\S+)/(\d+)\s+(\S+)\s+(up|down)\s+(\d+)(?:\s+([0-9A-Fa-f]{2}(?::[0-9A-Fa-f]{2})+))?\s*$",
        )
        .expect("valid interface regex")
    })
}

fn route_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\S+)/(\d+)\s+(\S+)\s+(\d+)(?:\s+(\S+))?\s*$").expect("valid route regex")
    })
}

/// Parse `--iflist` output from `source`, one line at a time.
pub async fn parse_iflist<R>(source: R) -> Result<ParsedOutput>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(source);
    let mut section = Section::Preamble;
    let mut out = ParsedOutput::default();
    let mut line = Vec::new();
    let mut offset: u64 = 0;

    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line).await?;
        if read == 0 {
            break;
        }
        if line.last() != Some(&b'\n') {
            return Err(Error::truncated(offset, "last line has no terminating newline"));
        }

        let text = std::str::from_utf8(&line)
            .map_err(|e| Error::malformed(offset, "line", format!("invalid UTF-8: {}", e)))?
            .trim_end();
        section = parse_line(text, section, offset, &mut out)?;
        offset += read as u64;
    }

    match section {
        Section::Routes => Ok(out),
        _ if offset == 0 => Err(Error::truncated(0, "no output")),
        _ => Err(Error::truncated(offset, "input ended before the routes table")),
    }
}

fn parse_line(
    text: &str,
    section: Section,
    offset: u64,
    out: &mut ParsedOutput,
) -> Result<Section> {
    let trimmed = text.trim();
    if trimmed.is_empty()
        || trimmed.starts_with("Starting Nmap")
        || trimmed.starts_with("WARNING")
    {
        return Ok(section);
    }

    let banner = trimmed.starts_with('*') || trimmed.contains("NONE FOUND");
    if banner && trimmed.contains("INTERFACES") {
        return Ok(Section::Interfaces);
    }
    if banner && trimmed.contains("ROUTES") {
        return Ok(Section::Routes);
    }

    match section {
        // Notices printed before the tables.
        Section::Preamble => {}
        Section::Interfaces => {
            if !trimmed.starts_with("DEV") {
                merge_interface(&mut out.interfaces, parse_interface(trimmed, offset)?);
            }
        }
        Section::Routes => {
            if !trimmed.starts_with("DST/MASK") {
                out.routes.push(parse_route(trimmed, offset)?);
            }
        }
    }
    Ok(section)
}

fn parse_interface(line: &str, offset: u64) -> Result<InterfaceInfo> {
    let caps = interface_regex().captures(line).ok_or_else(|| {
        Error::malformed(offset, "interface", format!("unrecognized row: {:?}", line))
    })?;

    let name = caps[1].to_string();
    let kind = caps[5].to_string();
    let addresses = match &caps[3] {
        "(none)" => Vec::new(),
        addr => {
            let ip = parse_ip(addr, "interface", offset)?;
            vec![InterfaceAddress {
                ip,
                prefix_len: parse_prefix(&caps, 4, ip, "interface", offset)?,
            }]
        }
    };

    let mtu = caps[7].parse::<u32>().map_err(|_| {
        Error::malformed(offset, "interface", format!("MTU out of range: {}", &caps[7]))
    })?;

    Ok(InterfaceInfo {
        short_name: caps[2].to_string(),
        addresses,
        mac: caps.get(8).map(|m| m.as_str().to_uppercase()),
        flags: InterfaceFlags {
            up: &caps[6] == "up",
            loopback: kind == "loopback",
        },
        kind,
        mtu,
        name,
    })
}

/// Fold a row into the list, merging rows that describe the same device.
fn merge_interface(interfaces: &mut Vec<InterfaceInfo>, row: InterfaceInfo) {
    match interfaces.iter_mut().find(|i| i.name == row.name) {
        Some(existing) => {
            for addr in row.addresses {
                if !existing.addresses.contains(&addr) {
                    existing.addresses.push(addr);
                }
            }
            if existing.mac.is_none() {
                existing.mac = row.mac;
            }
            existing.flags.up |= row.flags.up;
        }
        None => interfaces.push(row),
    }
}

fn parse_route(line: &str, offset: u64) -> Result<RouteInfo> {
    let caps = route_regex().captures(line).ok_or_else(|| {
        Error::malformed(offset, "route", format!("unrecognized row: {:?}", line))
    })?;

    let destination = parse_ip(&caps[1], "route", offset)?;
    let prefix_len = parse_prefix(&caps, 2, destination, "route", offset)?;
    let metric = caps[4].parse::<u32>().map_err(|_| {
        Error::malformed(offset, "route", format!("metric out of range: {}", &caps[4]))
    })?;
    let gateway = caps
        .get(5)
        .map(|m| parse_ip(m.as_str(), "route", offset))
        .transpose()?;

    Ok(RouteInfo {
        destination,
        prefix_len,
        device: caps[3].to_string(),
        metric,
        gateway,
    })
}

fn parse_ip(raw: &str, element: &str, offset: u64) -> Result<IpAddr> {
    // Link-local IPv6 addresses may carry a zone suffix (fe80::1%eth0).
    let raw = raw.split('%').next().unwrap_or(raw);
    raw.parse()
        .map_err(|_| Error::malformed(offset, element, format!("invalid IP address: {:?}", raw)))
}

fn parse_prefix(
    caps: &Captures<'_>,
    group: usize,
    ip: IpAddr,
    element: &str,
    offset: u64,
) -> Result<u8> {
    let raw = &caps[group];
    let max = if ip.is_ipv4() { 32 } else { 128 };
    match raw.parse::<u8>() {
        Ok(prefix) if prefix <= max => Ok(prefix),
        _ => Err(Error::malformed(
            offset,
            element,
            format!("prefix length out of range for {}: /{}", ip, raw),
        )),
    }
}
