//! Streaming parser for nmap's XML report (`-oX -`).
//!
//! Expected shape (abridged):
//! ```text
//! <nmaprun scanner="nmap" args="..." start="..." version="7.94">
//!   <scaninfo type="syn" protocol="tcp" numservices="1000" services="..."/>
//!   <host starttime="..." endtime="...">
//!     <status state="up" reason="syn-ack" reason_ttl="0"/>
//!     <address addr="10.0.0.1" addrtype="ipv4"/>
//!     <ports><port protocol="tcp" portid="22">...</port></ports>
//!   </host>
//!   <runstats><finished time="..." elapsed="..."/><hosts up="1" down="0" total="1"/></runstats>
//! </nmaprun>
//! ```

use std::io::ErrorKind;
use std::str::FromStr;

use quick_xml::errors::{IllFormedError, SyntaxError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use tokio::io::{AsyncRead, BufReader};
use tracing::trace;

use super::{ParsedOutput, Tracked};
use crate::error::{Error, Result};
use crate::models::{
    Address, AddressType, ExtraPorts, Host, HostState, HostStatus, Hostname, OsClass, OsMatch,
    Port, PortState, RunInfo, RunStats, ScanInfo, Script, Service, Uptime,
};

const ROOT: &str = "nmaprun";

/// Parse an XML report from `source`, reading it incrementally.
pub async fn parse_xml<R>(source: R) -> Result<ParsedOutput>
where
    R: AsyncRead + Unpin,
{
    let mut reader = Reader::from_reader(BufReader::new(Tracked::new(source)));
    reader.config_mut().trim_text(true);

    let mut doc = Document::default();
    let mut buf = Vec::new();

    loop {
        let event = match reader.read_event_into_async(&mut buf).await {
            Ok(event) => event,
            Err(err) => return Err(classify(err, &reader, &doc.stack)),
        };
        let offset = reader.buffer_position() as u64;

        match event {
            Event::Start(e) => doc.open(&e, offset)?,
            Event::Empty(e) => {
                doc.open(&e, offset)?;
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                doc.close(&name, offset)?;
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                doc.close(&name, offset)?;
            }
            Event::Text(t) => doc.text(&t, offset)?,
            Event::CData(c) => doc.text(&c, offset)?,
            Event::Eof => {
                let tracked = reader.get_ref().get_ref();
                trace!(
                    bytes = tracked.bytes(),
                    hosts = doc.out.hosts.len(),
                    "xml input exhausted"
                );
                return doc.finish(offset);
            }
            // Declarations, doctype, comments, processing instructions.
            _ => {}
        }
        buf.clear();
    }
}

/// Map a reader error to truncation or malformation.
///
/// quick-xml raises the `Unclosed*` syntax errors only when input runs out
/// inside markup. `InvalidBangMarkup` is ambiguous: `<!` at end of input is
/// a cut, `<!x` is not.
fn classify<R: AsyncRead + Unpin>(
    err: quick_xml::Error,
    reader: &Reader<BufReader<Tracked<R>>>,
    stack: &[String],
) -> Error {
    let offset = reader.error_position() as u64;
    let tracked = reader.get_ref().get_ref();
    let element = stack.last().map(String::as_str).unwrap_or("document");

    match err {
        quick_xml::Error::Syntax(SyntaxError::InvalidBangMarkup)
            if tracked.at_eof() && tracked.ends_with(b"<!") =>
        {
            Error::truncated(offset, "input ended inside <!")
        }
        quick_xml::Error::Syntax(e)
            if tracked.at_eof() && !matches!(e, SyntaxError::InvalidBangMarkup) =>
        {
            Error::truncated(offset, format!("input ended inside markup ({})", e))
        }
        quick_xml::Error::IllFormed(IllFormedError::MissingEndTag(tag)) => {
            Error::truncated(offset, format!("input ended inside <{}>", tag))
        }
        quick_xml::Error::Io(e) if e.kind() == ErrorKind::UnexpectedEof => {
            Error::truncated(offset, e.to_string())
        }
        quick_xml::Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), e.to_string())),
        other => Error::malformed(offset, element, other.to_string()),
    }
}

// ============================================================================
// Document state
// ============================================================================

#[derive(Default)]
struct Document {
    /// Names of currently open elements, root first.
    stack: Vec<String>,
    root_closed: bool,
    out: ParsedOutput,

    host: Option<Host>,
    port: Option<Port>,
    os_match: Option<OsMatch>,
    /// Raw text of the `<cpe>` element being read.
    text: Option<Vec<u8>>,

    saw_runstats: bool,
    finished: Option<RunStats>,
    host_counts: Option<(u32, u32, u32)>,
}

impl Document {
    fn open(&mut self, e: &BytesStart<'_>, offset: u64) -> Result<()> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();

        if self.root_closed {
            return Err(Error::malformed(
                offset,
                name,
                format!("element after closing </{}>", ROOT),
            ));
        }

        match self.stack.last().cloned() {
            None => {
                if name != ROOT {
                    return Err(Error::malformed(
                        offset,
                        name,
                        format!("unexpected root element, expected <{}>", ROOT),
                    ));
                }
                let attrs = Attrs::read(e, &name, offset)?;
                self.out.run = Some(RunInfo {
                    scanner: attrs.required("scanner")?.to_string(),
                    args: attrs.string("args"),
                    version: attrs.string("version"),
                    xml_output_version: attrs.string("xmloutputversion"),
                    start: attrs.uint("start", u64::MAX)?,
                    start_str: attrs.string("startstr"),
                });
            }
            Some(parent) => self.child(&parent, &name, e, offset)?,
        }

        self.stack.push(name);
        Ok(())
    }

    fn child(&mut self, parent: &str, name: &str, e: &BytesStart<'_>, offset: u64) -> Result<()> {
        match (parent, name) {
            ("nmaprun", "scaninfo") => {
                let a = Attrs::read(e, name, offset)?;
                self.out.scan_info.push(ScanInfo {
                    scan_type: a.required("type")?.to_string(),
                    protocol: a.required("protocol")?.to_string(),
                    num_services: a.uint_as::<u32>("numservices")?.unwrap_or(0),
                    services: a.string("services").unwrap_or_default(),
                });
            }
            ("nmaprun", "host") => {
                let a = Attrs::read(e, name, offset)?;
                self.host = Some(Host {
                    start_time: a.uint("starttime", u64::MAX)?,
                    end_time: a.uint("endtime", u64::MAX)?,
                    ..Default::default()
                });
            }
            ("host", "status") => {
                let a = Attrs::read(e, name, offset)?;
                if let Some(host) = self.host.as_mut() {
                    host.status = HostStatus {
                        state: HostState::parse(a.required("state")?),
                        reason: a.string("reason").unwrap_or_default(),
                        reason_ttl: a.uint_as::<u8>("reason_ttl")?,
                    };
                }
            }
            ("host", "address") => {
                let a = Attrs::read(e, name, offset)?;
                let kind = a.required("addrtype")?;
                let addr_type = AddressType::parse(kind)
                    .ok_or_else(|| a.error(format!("unknown addrtype {:?}", kind)))?;
                if let Some(host) = self.host.as_mut() {
                    host.addresses.push(Address {
                        addr: a.required("addr")?.to_string(),
                        addr_type,
                        vendor: a.string("vendor"),
                    });
                }
            }
            ("hostnames", "hostname") => {
                let a = Attrs::read(e, name, offset)?;
                if let Some(host) = self.host.as_mut() {
                    host.hostnames.push(Hostname {
                        name: a.required("name")?.to_string(),
                        kind: a.string("type"),
                    });
                }
            }
            ("ports", "extraports") => {
                let a = Attrs::read(e, name, offset)?;
                if let Some(host) = self.host.as_mut() {
                    host.extra_ports.push(ExtraPorts {
                        state: a.required("state")?.to_string(),
                        count: a.required_uint_as::<u32>("count")?,
                    });
                }
            }
            ("ports", "port") => {
                let a = Attrs::read(e, name, offset)?;
                self.port = Some(Port {
                    protocol: a.required("protocol")?.to_string(),
                    number: a.required_uint_as::<u16>("portid")?,
                    state: PortState::default(),
                    service: None,
                    scripts: Vec::new(),
                });
            }
            ("port", "state") => {
                let a = Attrs::read(e, name, offset)?;
                if let Some(port) = self.port.as_mut() {
                    port.state = PortState {
                        state: a.required("state")?.to_string(),
                        reason: a.string("reason").unwrap_or_default(),
                        reason_ttl: a.uint_as::<u8>("reason_ttl")?,
                    };
                }
            }
            ("port", "service") => {
                let a = Attrs::read(e, name, offset)?;
                let confidence = a.uint("conf", 10)?.map(|c| c as u8);
                if let Some(port) = self.port.as_mut() {
                    port.service = Some(Service {
                        name: a.required("name")?.to_string(),
                        product: a.string("product"),
                        version: a.string("version"),
                        extra_info: a.string("extrainfo"),
                        os_type: a.string("ostype"),
                        hostname: a.string("hostname"),
                        tunnel: a.string("tunnel"),
                        method: a.string("method"),
                        confidence,
                        cpes: Vec::new(),
                    });
                }
            }
            ("service", "cpe") | ("osclass", "cpe") => self.text = Some(Vec::new()),
            ("port", "script") => {
                let script = script(&Attrs::read(e, name, offset)?)?;
                if let Some(port) = self.port.as_mut() {
                    port.scripts.push(script);
                }
            }
            ("hostscript", "script") => {
                let script = script(&Attrs::read(e, name, offset)?)?;
                if let Some(host) = self.host.as_mut() {
                    host.scripts.push(script);
                }
            }
            ("os", "osmatch") => {
                let a = Attrs::read(e, name, offset)?;
                self.os_match = Some(OsMatch {
                    name: a.required("name")?.to_string(),
                    accuracy: a.required_uint("accuracy", 100)? as u8,
                    classes: Vec::new(),
                });
            }
            ("osmatch", "osclass") => {
                let a = Attrs::read(e, name, offset)?;
                let accuracy = a.uint("accuracy", 100)?.unwrap_or(0) as u8;
                if let Some(os_match) = self.os_match.as_mut() {
                    os_match.classes.push(OsClass {
                        kind: a.string("type"),
                        vendor: a.string("vendor"),
                        family: a.string("osfamily"),
                        generation: a.string("osgen"),
                        accuracy,
                        cpes: Vec::new(),
                    });
                }
            }
            ("host", "uptime") => {
                let a = Attrs::read(e, name, offset)?;
                let uptime = Uptime {
                    seconds: a.required_uint("seconds", u64::MAX)?,
                    last_boot: a.string("lastboot"),
                };
                if let Some(host) = self.host.as_mut() {
                    host.uptime = Some(uptime);
                }
            }
            ("host", "distance") => {
                let a = Attrs::read(e, name, offset)?;
                let value = a.required_uint_as::<u32>("value")?;
                if let Some(host) = self.host.as_mut() {
                    host.distance = Some(value);
                }
            }
            ("nmaprun", "runstats") => self.saw_runstats = true,
            ("runstats", "finished") => {
                let a = Attrs::read(e, name, offset)?;
                self.finished = Some(RunStats {
                    finished: a.required_uint("time", u64::MAX)?,
                    finished_str: a.string("timestr"),
                    elapsed: a.required_float("elapsed")?,
                    summary: a.string("summary"),
                    exit: a.string("exit"),
                    error_msg: a.string("errormsg"),
                    hosts_up: 0,
                    hosts_down: 0,
                    hosts_total: 0,
                });
            }
            ("runstats", "hosts") => {
                let a = Attrs::read(e, name, offset)?;
                self.host_counts = Some((
                    a.uint_as::<u32>("up")?.unwrap_or(0),
                    a.uint_as::<u32>("down")?.unwrap_or(0),
                    a.uint_as::<u32>("total")?.unwrap_or(0),
                ));
            }
            // hosthint, taskbegin, verbose, times, trace, ...
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, name: &str, offset: u64) -> Result<()> {
        match self.stack.pop() {
            Some(open) if open == name => {}
            Some(open) => {
                return Err(Error::malformed(
                    offset,
                    open.clone(),
                    format!("mismatched closing tag </{}> for <{}>", name, open),
                ))
            }
            None => {
                return Err(Error::malformed(
                    offset,
                    name,
                    "closing tag without matching opening tag",
                ))
            }
        }

        let parent = self.stack.last().map(String::as_str);
        match (parent, name) {
            (None, ROOT) => self.root_closed = true,
            (Some("nmaprun"), "host") => {
                if let Some(host) = self.host.take() {
                    self.out.hosts.push(host);
                }
            }
            (Some("ports"), "port") => {
                if let (Some(port), Some(host)) = (self.port.take(), self.host.as_mut()) {
                    host.ports.push(port);
                }
            }
            (Some("os"), "osmatch") => {
                if let (Some(os_match), Some(host)) = (self.os_match.take(), self.host.as_mut()) {
                    host.os_matches.push(os_match);
                }
            }
            (Some(parent), "cpe") => {
                if let Some(raw) = self.text.take() {
                    let cpe = decode_text(&raw, offset)?;
                    match parent {
                        "service" => {
                            if let Some(service) =
                                self.port.as_mut().and_then(|p| p.service.as_mut())
                            {
                                service.cpes.push(cpe);
                            }
                        }
                        "osclass" => {
                            if let Some(class) =
                                self.os_match.as_mut().and_then(|m| m.classes.last_mut())
                            {
                                class.cpes.push(cpe);
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, bytes: &[u8], offset: u64) -> Result<()> {
        if let Some(text) = self.text.as_mut() {
            text.extend_from_slice(bytes);
        } else if (self.stack.is_empty() || self.root_closed)
            && !bytes.iter().all(u8::is_ascii_whitespace)
        {
            return Err(Error::malformed(
                offset,
                "document",
                "text outside the root element",
            ));
        }
        Ok(())
    }

    fn finish(mut self, offset: u64) -> Result<ParsedOutput> {
        if !self.root_closed {
            let context = match self.stack.last() {
                Some(open) => format!("input ended inside <{}>", open),
                None => format!("input ended before <{}>", ROOT),
            };
            return Err(Error::truncated(offset, context));
        }

        let mut stats = match (self.saw_runstats, self.finished.take()) {
            (true, Some(stats)) => stats,
            _ => {
                return Err(Error::malformed(
                    offset,
                    ROOT,
                    "missing <runstats><finished>",
                ))
            }
        };
        if let Some((up, down, total)) = self.host_counts {
            stats.hosts_up = up;
            stats.hosts_down = down;
            stats.hosts_total = total;
        }

        self.out.stats = Some(stats);
        Ok(self.out)
    }
}

fn script(a: &Attrs<'_>) -> Result<Script> {
    Ok(Script {
        id: a.required("id")?.to_string(),
        output: a.string("output").unwrap_or_default(),
    })
}

fn decode_text(raw: &[u8], offset: u64) -> Result<String> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| Error::malformed(offset, "cpe", format!("invalid UTF-8: {}", e)))?;
    quick_xml::escape::unescape(text)
        .map(|s| s.trim().to_string())
        .map_err(|e| Error::malformed(offset, "cpe", e.to_string()))
}

// ============================================================================
// Attributes
// ============================================================================

/// Decoded attributes of one element, with validating accessors.
struct Attrs<'a> {
    element: &'a str,
    offset: u64,
    pairs: Vec<(String, String)>,
}

impl<'a> Attrs<'a> {
    fn read(e: &BytesStart<'_>, element: &'a str, offset: u64) -> Result<Self> {
        let mut pairs = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| Error::malformed(offset, element, err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| {
                    Error::malformed(offset, element, format!("attribute '{}': {}", key, err))
                })?
                .into_owned();
            pairs.push((key, value));
        }
        Ok(Self {
            element,
            offset,
            pairs,
        })
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn string(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }

    fn required(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| self.error(format!("missing required attribute '{}'", key)))
    }

    /// Unsigned integer no larger than `max`. Signs, fractions and
    /// out-of-range values are rejected, never clamped.
    fn uint(&self, key: &str, max: u64) -> Result<Option<u64>> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(self.error(format!(
                "attribute '{}' is not an unsigned integer: {:?}",
                key, raw
            )));
        }
        let value: u64 = raw
            .parse()
            .map_err(|_| self.error(format!("attribute '{}' overflows: {}", key, raw)))?;
        if value > max {
            return Err(self.error(format!(
                "attribute '{}' out of range (max {}): {}",
                key, max, value
            )));
        }
        Ok(Some(value))
    }

    fn required_uint(&self, key: &str, max: u64) -> Result<u64> {
        self.uint(key, max)?
            .ok_or_else(|| self.error(format!("missing required attribute '{}'", key)))
    }

    /// `uint` bounded by the target integer type.
    fn uint_as<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: Bounded,
    {
        Ok(self.uint(key, T::MAX)?.map(T::from_u64))
    }

    fn required_uint_as<T>(&self, key: &str) -> Result<T>
    where
        T: Bounded,
    {
        Ok(T::from_u64(self.required_uint(key, T::MAX)?))
    }

    fn required_float(&self, key: &str) -> Result<f64> {
        let raw = self.required(key)?;
        match f64::from_str(raw) {
            Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
            _ => Err(self.error(format!(
                "attribute '{}' is not a non-negative number: {:?}",
                key, raw
            ))),
        }
    }

    fn error(&self, reason: String) -> Error {
        Error::malformed(self.offset, self.element, reason)
    }
}

/// Integer types attribute values are narrowed into.
trait Bounded {
    const MAX: u64;
    fn from_u64(value: u64) -> Self;
}

macro_rules! bounded {
    ($($t:ty),*) => {
        $(impl Bounded for $t {
            const MAX: u64 = <$t>::MAX as u64;
            fn from_u64(value: u64) -> Self {
                value as $t
            }
        })*
    };
}

bounded!(u8, u16, u32);

#[cfg(test)]
mod tests {
    use super::*;

    const SCAN: &str = include_str!("testdata/scan.xml");

    async fn parse_str(input: &str) -> Result<ParsedOutput> {
        parse_xml(input.as_bytes()).await
    }

    #[tokio::test]
    async fn test_parse_fixture() {
        let parsed = parse_str(SCAN).await.unwrap();

        let run = parsed.run.as_ref().unwrap();
        assert_eq!(run.scanner, "nmap");
        assert_eq!(run.version.as_deref(), Some("7.94"));
        assert_eq!(run.start, Some(1714557600));

        assert_eq!(parsed.scan_info.len(), 1);
        assert_eq!(parsed.scan_info[0].scan_type, "syn");
        assert_eq!(parsed.scan_info[0].num_services, 3);

        // Hosts in document order; the hosthint entry is not a host.
        let addrs: Vec<_> = parsed
            .hosts
            .iter()
            .map(|h| h.addresses[0].addr.as_str())
            .collect();
        assert_eq!(addrs, vec!["192.168.1.1", "192.168.1.20", "192.168.1.30"]);

        let gateway = &parsed.hosts[0];
        assert_eq!(gateway.status.state, HostState::Up);
        assert_eq!(gateway.status.reason_ttl, Some(0));
        assert_eq!(gateway.hostnames[0].name, "router.lan");
        assert_eq!(gateway.ports.len(), 2);
        assert_eq!(gateway.extra_ports[0].count, 1);
        assert_eq!(gateway.mac().unwrap().vendor.as_deref(), Some("Ubiquiti"));

        let ssh = gateway.port(22).unwrap();
        let service = ssh.service.as_ref().unwrap();
        assert_eq!(service.product.as_deref(), Some("OpenSSH"));
        assert_eq!(service.confidence, Some(10));
        assert_eq!(
            service.cpes,
            vec!["cpe:/a:openbsd:openssh:8.9p1", "cpe:/o:linux:linux_kernel"]
        );
        assert_eq!(ssh.scripts[0].id, "ssh-hostkey");

        let http = gateway.port(80).unwrap();
        assert_eq!(http.scripts[0].output, "Router <Admin> & Setup");

        let os = gateway.best_os_match().unwrap();
        assert_eq!(os.name, "Linux 5.0 - 5.14");
        assert_eq!(os.accuracy, 98);
        assert_eq!(os.classes[0].cpes, vec!["cpe:/o:linux:linux_kernel:5"]);
        assert_eq!(gateway.uptime.as_ref().unwrap().seconds, 86400);
        assert_eq!(gateway.distance, Some(1));

        let down = &parsed.hosts[2];
        assert_eq!(down.status.state, HostState::Down);
        assert!(down.ports.is_empty());

        let stats = parsed.stats.unwrap();
        assert_eq!(stats.hosts_up, 2);
        assert_eq!(stats.hosts_down, 1);
        assert_eq!(stats.hosts_total, 3);
        assert_eq!(stats.exit.as_deref(), Some("success"));
        assert!((stats.elapsed - 12.34).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_parse_in_small_chunks() {
        let mut mock = tokio_test::io::Builder::new();
        for chunk in SCAN.as_bytes().chunks(7) {
            mock.read(chunk);
        }

        let streamed = parse_xml(mock.build()).await.unwrap();
        let whole = parse_str(SCAN).await.unwrap();
        assert_eq!(streamed, whole);
    }

    #[tokio::test]
    async fn test_truncation_at_every_byte() {
        let end = SCAN.find("</nmaprun>").unwrap() + "</nmaprun>".len();

        for cut in 0..end {
            match parse_str(&SCAN[..cut]).await {
                Err(Error::TruncatedOutput { .. }) => {}
                other => panic!("cut at byte {cut}: expected truncation, got {other:?}"),
            }
        }

        // Closing tag present: trailing newline is optional.
        assert!(parse_str(&SCAN[..end]).await.is_ok());
    }

    #[tokio::test]
    async fn test_truncation_with_gt_in_comment_and_attribute() {
        let doc = concat!(
            "<?xml version=\"1.0\"?>\n",
            "<!-- Nmap 7.94 scan as: nmap -oX - --script-args \"x=a>b\" 10.0.0.1 -->\n",
            "<nmaprun scanner=\"nmap\" args=\"nmap -oX - --script-args x=a>b 10.0.0.1\">\n",
            "<host><status state=\"up\" reason=\"user-set\"/>",
            "<address addr=\"10.0.0.1\" addrtype=\"ipv4\"/>",
            "<ports><port protocol=\"tcp\" portid=\"80\">",
            "<state state=\"open\" reason=\"syn-ack\"/>",
            "<script id=\"http-title\" output=\"a > b\"/></port></ports></host>\n",
            "<!-- x>y -->\n",
            "<runstats><finished time=\"2\" elapsed=\"1.00\"/></runstats>\n",
            "</nmaprun>\n",
        );
        let end = doc.find("</nmaprun>").unwrap() + "</nmaprun>".len();

        for cut in 0..end {
            match parse_str(&doc[..cut]).await {
                Err(Error::TruncatedOutput { .. }) => {}
                other => panic!("cut at byte {cut}: expected truncation, got {other:?}"),
            }
        }

        let parsed = parse_str(doc).await.unwrap();
        assert_eq!(
            parsed.run.unwrap().args.as_deref(),
            Some("nmap -oX - --script-args x=a>b 10.0.0.1")
        );
        assert_eq!(parsed.hosts[0].port(80).unwrap().scripts[0].output, "a > b");
    }

    #[tokio::test]
    async fn test_bang_markup_cut_vs_invalid() {
        let err = parse_str("<nmaprun scanner=\"nmap\"><!").await.unwrap_err();
        assert!(matches!(err, Error::TruncatedOutput { .. }), "{err:?}");

        let err = parse_str("<nmaprun scanner=\"nmap\"><!x></nmaprun>")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedOutput { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_empty_input_is_truncated() {
        let err = parse_str("").await.unwrap_err();
        assert!(matches!(err, Error::TruncatedOutput { offset: 0, .. }));
    }

    #[tokio::test]
    async fn test_unexpected_root() {
        let err = parse_str("<?xml version=\"1.0\"?><nmap></nmap>")
            .await
            .unwrap_err();
        match err {
            Error::MalformedOutput { element, .. } => assert_eq!(element, "nmap"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mismatched_nesting() {
        let input = r#"<nmaprun scanner="nmap"><host><ports></host></ports></nmaprun>"#;
        let err = parse_str(input).await.unwrap_err();
        assert!(matches!(err, Error::MalformedOutput { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_content_after_root() {
        let input = r#"<nmaprun scanner="nmap"><runstats><finished time="1" elapsed="0.1"/></runstats></nmaprun><host/>"#;
        let err = parse_str(input).await.unwrap_err();
        assert!(matches!(err, Error::MalformedOutput { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_text_instead_of_document() {
        let err = parse_str("Starting Nmap 7.94\nFailed to resolve host\n")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedOutput { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_missing_runstats() {
        let err = parse_str(r#"<nmaprun scanner="nmap"></nmaprun>"#)
            .await
            .unwrap_err();
        match err {
            Error::MalformedOutput { element, .. } => assert_eq!(element, "nmaprun"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    fn with_port(port_attrs: &str) -> String {
        format!(
            r#"<nmaprun scanner="nmap"><host><status state="up"/><address addr="10.0.0.1" addrtype="ipv4"/><ports><port {port_attrs}><state state="open" reason="syn-ack"/></port></ports></host><runstats><finished time="1" elapsed="1.0"/></runstats></nmaprun>"#
        )
    }

    #[tokio::test]
    async fn test_numeric_validation() {
        for attrs in [
            r#"protocol="tcp" portid="70000""#,
            r#"protocol="tcp" portid="-1""#,
            r#"protocol="tcp" portid="22.5""#,
            r#"protocol="tcp" portid="""#,
            r#"protocol="tcp""#,
        ] {
            match parse_str(&with_port(attrs)).await {
                Err(Error::MalformedOutput { element, .. }) => assert_eq!(element, "port"),
                other => panic!("{attrs}: unexpected result {other:?}"),
            }
        }

        let parsed = parse_str(&with_port(r#"protocol="tcp" portid="65535""#))
            .await
            .unwrap();
        assert_eq!(parsed.hosts[0].ports[0].number, 65535);
    }

    #[tokio::test]
    async fn test_accuracy_out_of_range() {
        let input = r#"<nmaprun scanner="nmap"><host><os><osmatch name="x" accuracy="101"/></os></host><runstats><finished time="1" elapsed="1"/></runstats></nmaprun>"#;
        let err = parse_str(input).await.unwrap_err();
        assert!(matches!(err, Error::MalformedOutput { ref element, .. } if element == "osmatch"));
    }

    #[tokio::test]
    async fn test_minimal_document_without_hosts() {
        let input = r#"<nmaprun scanner="nmap"><verbose level="0"/><runstats><finished time="5" elapsed="0.02"/><hosts up="0" down="0" total="0"/></runstats></nmaprun>"#;
        let parsed = parse_str(input).await.unwrap();
        assert!(parsed.hosts.is_empty());
        assert_eq!(parsed.stats.unwrap().finished, 5);
        assert!(parsed.run.unwrap().version.is_none());
    }
}
