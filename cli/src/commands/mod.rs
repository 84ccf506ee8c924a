//! Subcommand implementations.

pub mod config;
pub mod interfaces;
pub mod parse;
pub mod scan;
pub mod tool;

use nmapkit_core::{ConfigStore, ScanOption};

/// Persisted defaults as options; empty if no config can be located.
pub(crate) async fn stored_options() -> anyhow::Result<Vec<ScanOption>> {
    match ConfigStore::new() {
        Ok(store) => Ok(store.load().await?.to_options()),
        Err(_) => Ok(Vec::new()),
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max - 1).collect();
        format!("{}…", head)
    }
}
