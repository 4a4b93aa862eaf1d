//! Hosts-style list consumed by the DNS resolver.
//!
//! ```text
//! 0.0.0.0 pi.hole
//! 0.0.0.0 <hostname>
//! 0.0.0.0 ads.example.com
//! ```
//!
//! With an IPv6 sink configured every name gets a second line for it.

use crate::config::Config;
use crate::engine::CompiledSet;
use crate::error::{GravityError, Result};
use std::io::{self, BufWriter, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

const SELF_NAME: &str = "pi.hole";

pub struct HostsExporter {
    path: PathBuf,
    ipv4: Ipv4Addr,
    ipv6: Option<Ipv6Addr>,
    hostname: String,
}

impl HostsExporter {
    pub fn new(
        path: impl Into<PathBuf>,
        ipv4: Ipv4Addr,
        ipv6: Option<Ipv6Addr>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            ipv4,
            ipv6,
            hostname: hostname.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.export.path,
            config.network.ipv4,
            config.network.ipv6,
            config.local_hostname(),
        )
    }

    fn sinks(&self) -> impl Iterator<Item = IpAddr> {
        std::iter::once(IpAddr::V4(self.ipv4)).chain(self.ipv6.map(IpAddr::V6))
    }

    /// Writes the list to `out`: self-identification lines first, then one
    /// line per sink address for every domain in set order.
    pub fn render<W: Write>(&self, out: &mut W, domains: &CompiledSet) -> io::Result<()> {
        for ip in self.sinks() {
            writeln!(out, "{ip} {SELF_NAME}")?;
            writeln!(out, "{ip} {}", self.hostname)?;
        }
        for domain in domains {
            for ip in self.sinks() {
                writeln!(out, "{ip} {domain}")?;
            }
        }
        Ok(())
    }

    /// Replaces the export file in one rename. Readers see either the old
    /// file or the complete new one.
    pub fn write(&self, domains: &CompiledSet) -> Result<()> {
        self.write_atomic(domains).map_err(|source| GravityError::Export {
            path: self.path.display().to_string(),
            source,
        })?;
        info!(
            path = %self.path.display(),
            domains = domains.len(),
            "Exported blocklist"
        );
        Ok(())
    }

    fn write_atomic(&self, domains: &CompiledSet) -> io::Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(&mut tmp);
            self.render(&mut writer, domains)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;

        // The resolver usually runs as another user.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o644))?;
        }

        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains(items: &[&str]) -> CompiledSet {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn rendered(exporter: &HostsExporter, set: &CompiledSet) -> String {
        let mut buf = Vec::new();
        exporter.render(&mut buf, set).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_ipv4_only() {
        let exporter = HostsExporter::new("unused", Ipv4Addr::new(10, 0, 0, 2), None, "pi");
        let out = rendered(&exporter, &domains(&["b.com", "a.com"]));
        assert_eq!(
            out,
            "10.0.0.2 pi.hole\n10.0.0.2 pi\n10.0.0.2 a.com\n10.0.0.2 b.com\n"
        );
    }

    #[test]
    fn test_ipv6_adds_line_per_name() {
        let exporter = HostsExporter::new(
            "unused",
            Ipv4Addr::new(10, 0, 0, 2),
            Some("fd00::2".parse().unwrap()),
            "pi",
        );
        let out = rendered(&exporter, &domains(&["a.com"]));
        assert_eq!(
            out,
            "10.0.0.2 pi.hole\n10.0.0.2 pi\nfd00::2 pi.hole\nfd00::2 pi\n\
             10.0.0.2 a.com\nfd00::2 a.com\n"
        );
    }

    #[test]
    fn test_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gravity.list");
        std::fs::write(&path, "stale contents\n").unwrap();

        let exporter = HostsExporter::new(&path, Ipv4Addr::new(10, 0, 0, 2), None, "pi");
        exporter.write(&domains(&["x.com"])).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "10.0.0.2 pi.hole\n10.0.0.2 pi\n10.0.0.2 x.com\n");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
