use crate::engine::ResolverReload;
use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::info;

/// Reloads a dnsmasq-style resolver with `SIGHUP`, or starts its service when
/// no process is running.
pub struct DnsmasqReload {
    process: String,
}

impl DnsmasqReload {
    pub fn new(process: impl Into<String>) -> Self {
        Self {
            process: process.into(),
        }
    }

    async fn is_running(&self) -> bool {
        Command::new("pidof")
            .args(["-s", self.process.as_str()])
            .output()
            .await
            .map(|out| out.status.success())
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl ResolverReload for DnsmasqReload {
    async fn reload(&self) -> Result<()> {
        let status = if self.is_running().await {
            info!("Sending SIGHUP to {}", self.process);
            Command::new("killall")
                .args(["-s", "HUP", self.process.as_str()])
                .status()
                .await
                .context("Failed to run killall")?
        } else {
            info!("{} is not running, starting service", self.process);
            Command::new("service")
                .args([self.process.as_str(), "start"])
                .status()
                .await
                .context("Failed to run service")?
        };

        if !status.success() {
            bail!("Reloading {} exited with {}", self.process, status);
        }
        Ok(())
    }
}
