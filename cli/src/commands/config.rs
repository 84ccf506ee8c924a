//! Config command - show and change scanner defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use nmapkit_core::ConfigStore;

pub async fn show(json: bool) -> Result<()> {
    let store = ConfigStore::new()?;
    let config = store.load().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    println!("Config file:  {}", store.path().display());
    println!(
        "Binary:       {}",
        config
            .binary_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(search PATH)".to_string())
    );
    println!("Grace period: {}ms", config.grace_period_ms);
    println!(
        "Timeout:      {}",
        config
            .timeout_secs
            .map(|s| format!("{}s", s))
            .unwrap_or_else(|| "none".to_string())
    );
    if !config.env.is_empty() {
        println!("Environment:");
        for (key, value) in &config.env {
            println!("  {}={}", key, value);
        }
    }
    Ok(())
}

pub async fn set_binary(path: Option<PathBuf>) -> Result<()> {
    let store = ConfigStore::new()?;
    match &path {
        Some(p) => println!("Using nmap at {}", p.display()),
        None => println!("Searching PATH for nmap"),
    }
    store.set_binary_path(path).await?;
    Ok(())
}

pub async fn set_grace(millis: u64) -> Result<()> {
    ConfigStore::new()?
        .set_grace_period(Duration::from_millis(millis))
        .await?;
    println!("Grace period set to {}ms", millis);
    Ok(())
}

pub async fn set_timeout(secs: Option<u64>) -> Result<()> {
    ConfigStore::new()?
        .set_timeout(secs.map(Duration::from_secs))
        .await?;
    match secs {
        Some(s) => println!("Timeout set to {}s", s),
        None => println!("Timeout cleared"),
    }
    Ok(())
}
