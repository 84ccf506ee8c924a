//! Locating the nmap binary and checking its version.
//!
//! The binary found through `PATH` (or the well-known install locations) is
//! probed once per process and cached. Explicitly configured binaries are
//! probed every time a scanner is built for them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};

/// Oldest nmap release whose XML output this crate understands.
pub const MINIMUM_VERSION: ToolVersion = ToolVersion::new(7, 0, 0);

/// Install locations checked after `PATH`.
const NMAP_PATHS: &[&str] = &[
    "/opt/homebrew/bin/nmap", // Apple Silicon
    "/usr/local/bin/nmap",    // Intel Mac / Homebrew / source builds
    "/usr/bin/nmap",          // System
    "/snap/bin/nmap",
];

#[cfg(windows)]
const BINARY_NAME: &str = "nmap.exe";
#[cfg(not(windows))]
const BINARY_NAME: &str = "nmap";

/// Timeout for `nmap --version`.
const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

static DEFAULT_TOOL: OnceCell<ToolInfo> = OnceCell::const_new();

// ============================================================================
// ToolVersion
// ============================================================================

/// A parsed `major.minor[.patch]` nmap version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ToolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ToolVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Extract the version from `nmap --version` output.
    ///
    /// Expected format:
    /// ```text
    /// Nmap version 7.94SVN ( https://nmap.org )
    /// Platform: x86_64-pc-linux-gnu
    /// ```
    pub fn parse(output: &str) -> Option<Self> {
        static VERSION_RE: OnceLock<Regex> = OnceLock::new();
        let re = VERSION_RE.get_or_init(|| {
            Regex::new(r"Nmap version (\d+)\.(\d+)(?:\.(\d+))?").expect("valid version regex")
        });

        let caps = re.captures(output)?;
        let major = caps[1].parse().ok()?;
        let minor = caps[2].parse().ok()?;
        let patch = match caps.get(3) {
            Some(m) => m.as_str().parse().ok()?,
            None => 0,
        };
        Some(Self::new(major, minor, patch))
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.patch == 0 {
            write!(f, "{}.{:02}", self.major, self.minor)
        } else {
            write!(f, "{}.{:02}.{}", self.major, self.minor, self.patch)
        }
    }
}

// ============================================================================
// ToolInfo
// ============================================================================

/// A located and version-checked nmap binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Path the binary is executed from.
    pub path: PathBuf,
    /// Parsed version.
    pub version: ToolVersion,
    /// First line of `nmap --version`.
    pub banner: String,
}

/// Resolve and validate the nmap binary.
///
/// With `binary` set, that binary is probed and nothing is cached. A bare
/// name such as `nmap` is looked up on `PATH`; a path with a directory part
/// is used as given. Otherwise the default binary is discovered and cached
/// for the process lifetime after the first successful probe.
pub async fn resolve(binary: Option<&Path>) -> Result<ToolInfo> {
    match binary {
        Some(path) => probe(&locate(path)?).await,
        None => DEFAULT_TOOL
            .get_or_try_init(|| async {
                let path = find_nmap()?;
                probe(&path).await
            })
            .await
            .cloned(),
    }
}

/// Search `PATH` and the well-known install locations for nmap.
pub fn find_nmap() -> Result<PathBuf> {
    first_executable(candidate_paths())
}

fn locate(binary: &Path) -> Result<PathBuf> {
    if is_bare_name(binary) {
        locate_in(binary, &path_dirs())
    } else {
        Ok(binary.to_path_buf())
    }
}

fn locate_in(name: &Path, dirs: &[PathBuf]) -> Result<PathBuf> {
    first_executable(dirs.iter().map(|dir| dir.join(name)).collect())
}

/// `nmap` rather than `./nmap` or `/usr/bin/nmap`.
fn is_bare_name(path: &Path) -> bool {
    !path.as_os_str().is_empty() && path.parent() == Some(Path::new(""))
}

fn first_executable(candidates: Vec<PathBuf>) -> Result<PathBuf> {
    candidates
        .iter()
        .find(|path| is_executable(path))
        .cloned()
        .ok_or(Error::ToolNotFound {
            searched: candidates,
        })
}

fn path_dirs() -> Vec<PathBuf> {
    std::env::var_os("PATH")
        .map(|path| std::env::split_paths(&path).collect())
        .unwrap_or_default()
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = path_dirs()
        .into_iter()
        .map(|dir| dir.join(BINARY_NAME))
        .collect();

    for fallback in NMAP_PATHS {
        let fallback = PathBuf::from(fallback);
        if !paths.contains(&fallback) {
            paths.push(fallback);
        }
    }
    paths
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Run `<path> --version` and check the result against [`MINIMUM_VERSION`].
async fn probe(path: &Path) -> Result<ToolInfo> {
    if !is_executable(path) {
        return Err(Error::ToolNotFound {
            searched: vec![path.to_path_buf()],
        });
    }

    let result = timeout(VERSION_TIMEOUT, async {
        Command::new(path)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
    })
    .await;

    let output = match result {
        Ok(Ok(output)) => output,
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::ToolNotFound {
                searched: vec![path.to_path_buf()],
            })
        }
        Ok(Err(e)) => {
            return Err(Error::CommandFailed(format!(
                "Failed to run {} --version: {}",
                path.display(),
                e
            )))
        }
        Err(_) => {
            return Err(Error::CommandFailed(format!(
                "{} --version did not answer within {:?}",
                path.display(),
                VERSION_TIMEOUT
            )))
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let banner = stdout
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or_default()
        .trim()
        .to_string();

    let version = ToolVersion::parse(&stdout).ok_or_else(|| Error::UnsupportedVersion {
        found: if banner.is_empty() {
            "<no version output>".to_string()
        } else {
            banner.clone()
        },
        minimum: MINIMUM_VERSION,
    })?;

    if version < MINIMUM_VERSION {
        return Err(Error::UnsupportedVersion {
            found: version.to_string(),
            minimum: MINIMUM_VERSION,
        });
    }

    debug!(path = %path.display(), %version, "nmap binary resolved");

    Ok(ToolInfo {
        path: path.to_path_buf(),
        version,
        banner,
    })
}
