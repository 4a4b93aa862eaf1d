use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default = "default_seed_sources")]
    pub seed_sources: Vec<String>,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub updates: UpdateConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Addresses the exported list points blocked names at.
#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    #[serde(default = "default_ipv4")]
    pub ipv4: Ipv4Addr,
    /// IPv6 lines are only written when this is set.
    #[serde(default)]
    pub ipv6: Option<Ipv6Addr>,
    /// Overrides the system hostname in the self-identification lines.
    #[serde(default)]
    pub hostname: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_export_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpdateConfig {
    #[serde(default = "default_concurrent_downloads")]
    pub concurrent_downloads: usize,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_whitelist_source_hosts")]
    pub whitelist_source_hosts: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResolverConfig {
    #[serde(default = "default_reload")]
    pub reload: bool,
    #[serde(default = "default_process")]
    pub process: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Defaults
fn default_database_path() -> String {
    "gravity.db".to_string()
}
fn default_ipv4() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}
fn default_export_path() -> String {
    "gravity.list".to_string()
}
fn default_concurrent_downloads() -> usize {
    4
}
fn default_timeout_seconds() -> u64 {
    5
}
fn default_user_agent() -> String {
    "Gravity/1.0".to_string()
}
fn default_whitelist_source_hosts() -> bool {
    true
}
fn default_reload() -> bool {
    true
}
fn default_process() -> String {
    "dnsmasq".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_seed_sources() -> Vec<String> {
    [
        "https://raw.githubusercontent.com/StevenBlack/hosts/master/hosts",
        "http://adblock.gjtech.net/?format=unix-hosts",
        "http://mirror1.malwaredomains.com/files/justdomains",
        "http://sysctl.org/cameleon/hosts",
        "https://zeustracker.abuse.ch/blocklist.php?download=domainblocklist",
        "https://s3.amazonaws.com/lists.disconnect.me/simple_tracking.txt",
        "https://s3.amazonaws.com/lists.disconnect.me/simple_ad.txt",
        "https://hosts-file.net/ad_servers.txt",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            seed_sources: default_seed_sources(),
            network: NetworkConfig::default(),
            export: ExportConfig::default(),
            updates: UpdateConfig::default(),
            resolver: ResolverConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ipv4: default_ipv4(),
            ipv6: None,
            hostname: None,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            path: default_export_path(),
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            concurrent_downloads: default_concurrent_downloads(),
            timeout_seconds: default_timeout_seconds(),
            user_agent: default_user_agent(),
            whitelist_source_hosts: default_whitelist_source_hosts(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            reload: default_reload(),
            process: default_process(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config TOML")?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.updates.timeout_seconds)
    }

    /// Hostname written next to `pi.hole` in the export file.
    pub fn local_hostname(&self) -> String {
        if let Some(name) = &self.network.hostname {
            return name.clone();
        }
        hostname::get().map_or_else(
            |_| "localhost".to_string(),
            |h| h.to_string_lossy().into_owned(),
        )
    }
}
