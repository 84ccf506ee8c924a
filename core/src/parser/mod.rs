//! Parsers for the tool's structured output.
//!
//! Both parsers read incrementally from an [`AsyncRead`], so they can run
//! while the tool is still writing. Neither returns a partial result: the
//! input either parses completely or produces `TruncatedOutput` /
//! `MalformedOutput`.

mod iflist;
mod xml;

use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, BufReader, ReadBuf};

use crate::error::Result;
use crate::models::{
    Host, InterfaceInfo, RouteInfo, RunInfo, RunStats, ScanInfo, ScanMetadata, ScanResult,
};

pub use iflist::parse_iflist;
pub use xml::parse_xml;

/// Which structured output the tool is asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputFormat {
    /// `-oX -`: XML report on stdout.
    #[default]
    Xml,
    /// `--iflist`: interface and route tables.
    InterfaceList,
}

/// Everything recovered from one complete output document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedOutput {
    pub run: Option<RunInfo>,
    pub scan_info: Vec<ScanInfo>,
    pub hosts: Vec<Host>,
    pub stats: Option<RunStats>,
    pub interfaces: Vec<InterfaceInfo>,
    pub routes: Vec<RouteInfo>,
}

impl ParsedOutput {
    /// Attach run metadata. The document's own run attributes replace
    /// `metadata.run`.
    pub fn into_result(self, mut metadata: ScanMetadata) -> ScanResult {
        metadata.run = self.run;
        ScanResult {
            metadata,
            scan_info: self.scan_info,
            hosts: self.hosts,
            stats: self.stats,
            interfaces: self.interfaces,
            routes: self.routes,
        }
    }
}

/// Parse `source` according to `format`.
pub async fn parse<R>(format: OutputFormat, source: R) -> Result<ParsedOutput>
where
    R: AsyncRead + Unpin,
{
    match format {
        OutputFormat::Xml => parse_xml(source).await,
        OutputFormat::InterfaceList => parse_iflist(source).await,
    }
}

/// Parse a saved XML report.
///
/// Metadata comes from the document itself: the recorded command line,
/// start time, and finish time.
pub async fn parse_file(path: impl AsRef<Path>) -> Result<ScanResult> {
    let file = tokio::fs::File::open(path.as_ref()).await?;
    let parsed = parse_xml(BufReader::new(file)).await?;

    let run = parsed.run.as_ref();
    let metadata = ScanMetadata {
        command_line: run
            .and_then(|r| r.args.as_deref())
            .map(|args| args.split_whitespace().map(String::from).collect())
            .unwrap_or_default(),
        started_at: run.and_then(|r| r.start).unwrap_or_default(),
        finished_at: parsed.stats.as_ref().map(|s| s.finished).unwrap_or_default(),
        exit_code: None,
        run: None,
    };
    Ok(parsed.into_result(metadata))
}

/// Byte-counting reader that remembers how the stream ended.
///
/// Keeps the last two bytes read so a cut right after `<!` can be told
/// from a bad `<!` construct.
pub(crate) struct Tracked<R> {
    inner: R,
    bytes: u64,
    eof: bool,
    tail: [u8; 2],
}

impl<R> Tracked<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            bytes: 0,
            eof: false,
            tail: [0; 2],
        }
    }

    pub(crate) fn bytes(&self) -> u64 {
        self.bytes
    }

    pub(crate) fn at_eof(&self) -> bool {
        self.eof
    }

    /// Whether the input seen so far ends with `suffix` (at most two bytes).
    pub(crate) fn ends_with(&self, suffix: &[u8]) -> bool {
        let seen = self.bytes.min(2) as usize;
        suffix.len() <= seen && self.tail[2 - seen..].ends_with(suffix)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for Tracked<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);

        if let Poll::Ready(Ok(())) = &poll {
            let fresh = &buf.filled()[before..];
            match fresh {
                [] => this.eof = true,
                [byte] => this.tail = [this.tail[1], *byte],
                [.., a, b] => this.tail = [*a, *b],
            }
            this.bytes += fresh.len() as u64;
        }
        poll
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_tracked_reader() {
        let mut tracked = Tracked::new(&b"<a><b attr=\"x"[..]);
        let mut out = Vec::new();
        tracked.read_to_end(&mut out).await.unwrap();

        assert_eq!(tracked.bytes(), 13);
        assert!(tracked.at_eof());
        assert!(tracked.ends_with(b"\"x"));
        assert!(!tracked.ends_with(b"<!"));

        let mut tracked = Tracked::new(&b"!"[..]);
        tracked.read_to_end(&mut out).await.unwrap();
        assert!(tracked.ends_with(b"!"));
        assert!(!tracked.ends_with(b"<!"));
    }

    #[tokio::test]
    async fn test_dispatch_by_format() {
        let iflist = "************************INTERFACES************************\n\
                      DEV (SHORT) IP/MASK TYPE UP MTU MAC\n\
                      lo (lo) 127.0.0.1/8 loopback up 65536\n\
                      \n\
                      ROUTES: NONE FOUND(!)\n";
        let parsed = parse(OutputFormat::InterfaceList, iflist.as_bytes())
            .await
            .unwrap();
        assert_eq!(parsed.interfaces.len(), 1);
        assert!(parsed.hosts.is_empty());

        let err = parse(OutputFormat::Xml, iflist.as_bytes()).await.unwrap_err();
        assert!(err.is_parse_error());
    }

    #[tokio::test]
    async fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xml");
        std::fs::write(&path, include_str!("testdata/scan.xml")).unwrap();

        let result = parse_file(&path).await.unwrap();
        assert_eq!(result.hosts.len(), 3);
        assert_eq!(result.metadata.started_at, 1714557600);
        assert_eq!(result.metadata.command_line.first().map(String::as_str), Some("nmap"));
        assert!(result.metadata.finished_at >= result.metadata.started_at);
        assert!(result.metadata.run.is_some());

        let missing = parse_file(dir.path().join("missing.xml")).await;
        assert!(matches!(missing, Err(crate::error::Error::Io(_))));
    }
}
