//! Persisted scanner defaults.
//!
//! Stores configuration in JSON format at `~/.nmapkit/config.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::options::{self, ScanOption, DEFAULT_GRACE_PERIOD};

/// Configuration data stored in JSON format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// nmap binary to use instead of searching `PATH`.
    #[serde(default, rename = "binaryPath", skip_serializing_if = "Option::is_none")]
    pub binary_path: Option<PathBuf>,

    /// Milliseconds between SIGTERM and SIGKILL.
    #[serde(default = "default_grace_period_ms", rename = "gracePeriodMs")]
    pub grace_period_ms: u64,

    /// Overall run timeout in seconds; absent means none.
    #[serde(default, rename = "timeoutSecs", skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Extra environment for the nmap process.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

fn default_grace_period_ms() -> u64 {
    DEFAULT_GRACE_PERIOD.as_millis() as u64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            binary_path: None,
            grace_period_ms: default_grace_period_ms(),
            timeout_secs: None,
            env: BTreeMap::new(),
        }
    }
}

impl Config {
    /// The runtime options these defaults stand for.
    ///
    /// Options applied later override these, so callers put them first.
    pub fn to_options(&self) -> Vec<ScanOption> {
        let mut opts = vec![options::grace_period(Duration::from_millis(
            self.grace_period_ms,
        ))];
        if let Some(path) = &self.binary_path {
            opts.push(options::binary_path(path.clone()));
        }
        if let Some(secs) = self.timeout_secs {
            opts.push(options::timeout(Duration::from_secs(secs)));
        }
        for (key, value) in &self.env {
            opts.push(options::env(key.clone(), value.clone()));
        }
        opts
    }
}

/// Configuration store for scanner defaults.
///
/// Handles reading and writing configuration to `~/.nmapkit/config.json`.
pub struct ConfigStore {
    /// Path to the configuration file.
    config_path: PathBuf,
}

impl ConfigStore {
    /// Create a new config store with the default path.
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

        Ok(Self {
            config_path: home.join(".nmapkit").join("config.json"),
        })
    }

    /// Create a config store with a custom path.
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from disk.
    ///
    /// Returns default config if the file doesn't exist.
    pub async fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub async fn save(&self, config: &Config) -> Result<()> {
        if let Some(config_dir) = self.config_path.parent() {
            fs::create_dir_all(config_dir)
                .await
                .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        // Write atomically by writing to temp file then renaming
        let temp_path = self.config_path.with_extension("json.tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to create temp config file: {}", e)))?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;

        file.sync_all()
            .await
            .map_err(|e| Error::Config(format!("Failed to sync config: {}", e)))?;

        fs::rename(&temp_path, &self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to rename config file: {}", e)))?;

        Ok(())
    }

    /// Set or clear the nmap binary path.
    pub async fn set_binary_path(&self, path: Option<PathBuf>) -> Result<()> {
        let mut config = self.load().await?;
        config.binary_path = path;
        self.save(&config).await
    }

    pub async fn set_grace_period(&self, period: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(Error::Config("Grace period must be positive".to_string()));
        }
        let mut config = self.load().await?;
        config.grace_period_ms = period.as_millis() as u64;
        self.save(&config).await
    }

    /// Set or clear the run timeout.
    pub async fn set_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        if timeout.is_some_and(|t| t.as_secs() == 0) {
            return Err(Error::Config("Timeout must be at least one second".to_string()));
        }
        let mut config = self.load().await?;
        config.timeout_secs = timeout.map(|t| t.as_secs());
        self.save(&config).await
    }

    pub async fn set_env(&self, key: &str, value: Option<&str>) -> Result<()> {
        let mut config = self.load().await?;
        match value {
            Some(value) => config.env.insert(key.to_string(), value.to_string()),
            None => config.env.remove(key),
        };
        self.save(&config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::ScannerBuilder;
    use tempfile::tempdir;

    fn test_store() -> (ConfigStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        (ConfigStore::with_path(path), dir)
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _dir) = test_store();
        let config = store.load().await.unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.grace_period_ms, 2000);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _dir) = test_store();

        store
            .set_binary_path(Some(PathBuf::from("/opt/nmap/bin/nmap")))
            .await
            .unwrap();
        store.set_grace_period(Duration::from_millis(750)).await.unwrap();
        store.set_timeout(Some(Duration::from_secs(600))).await.unwrap();
        store.set_env("NMAPDIR", Some("/opt/nmap/share")).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.binary_path, Some(PathBuf::from("/opt/nmap/bin/nmap")));
        assert_eq!(loaded.grace_period_ms, 750);
        assert_eq!(loaded.timeout_secs, Some(600));
        assert_eq!(loaded.env.get("NMAPDIR").map(String::as_str), Some("/opt/nmap/share"));
        assert!(!store.path().with_extension("json.tmp").exists());

        store.set_timeout(None).await.unwrap();
        store.set_env("NMAPDIR", None).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.timeout_secs, None);
        assert!(loaded.env.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_zero_durations() {
        let (store, _dir) = test_store();
        assert!(store.set_grace_period(Duration::ZERO).await.is_err());
        assert!(store.set_timeout(Some(Duration::from_millis(10))).await.is_err());
    }

    #[tokio::test]
    async fn test_partial_and_invalid_files() {
        let (store, _dir) = test_store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();

        std::fs::write(store.path(), r#"{"timeoutSecs": 30}"#).unwrap();
        let config = store.load().await.unwrap();
        assert_eq!(config.timeout_secs, Some(30));
        assert_eq!(config.grace_period_ms, 2000);

        std::fs::write(store.path(), "{not json").unwrap();
        assert!(matches!(store.load().await, Err(Error::Config(_))));
    }

    #[test]
    fn test_to_options() {
        let config = Config {
            binary_path: Some(PathBuf::from("/usr/bin/nmap")),
            grace_period_ms: 500,
            timeout_secs: Some(60),
            env: BTreeMap::from([("NMAPDIR".to_string(), "/tmp".to_string())]),
        };

        let mut builder = ScannerBuilder::new();
        for option in config.to_options() {
            option.apply(&mut builder).unwrap();
        }

        let settings = builder.settings();
        assert_eq!(settings.binary, Some(PathBuf::from("/usr/bin/nmap")));
        assert_eq!(settings.grace_period, Duration::from_millis(500));
        assert_eq!(settings.timeout, Some(Duration::from_secs(60)));
        assert_eq!(settings.env, vec![("NMAPDIR".to_string(), "/tmp".to_string())]);
    }
}
