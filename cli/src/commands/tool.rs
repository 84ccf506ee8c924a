//! Tool command - show which nmap binary is used.

use anyhow::Result;
use nmapkit_core::{tool, ConfigStore, MINIMUM_VERSION};

pub async fn run(json: bool) -> Result<()> {
    let config = ConfigStore::new()?.load().await?;
    let info = tool::resolve(config.binary_path.as_deref()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Binary:  {}", info.path.display());
    println!("Version: {} (minimum {})", info.version, MINIMUM_VERSION);
    println!("Banner:  {}", info.banner);
    Ok(())
}
