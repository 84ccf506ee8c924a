//! Parse command - read a saved XML report.

use std::path::Path;

use anyhow::{Context, Result};

use super::scan::print_result;

pub async fn run(file: &Path, json: bool) -> Result<()> {
    let result = nmapkit_core::parse_file(file)
        .await
        .with_context(|| format!("Failed to read report {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}
