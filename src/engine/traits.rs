use crate::error::Result;
use chrono::{DateTime, Utc};

/// Freshness signals a remote source reported about its content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Freshness {
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl Freshness {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// A fully downloaded and parsed list.
#[derive(Debug, Clone, Default)]
pub struct Download {
    /// Domains in file order; may contain repeats.
    pub domains: Vec<String>,
    pub freshness: Freshness,
}

/// Transport for remote lists.
#[async_trait::async_trait]
pub trait ListClient: Send + Sync {
    /// Metadata-only request against `uri`.
    async fn probe(&self, uri: &str) -> Result<Freshness>;

    /// Downloads and parses the content of `uri`.
    async fn download(&self, uri: &str) -> Result<Download>;
}

/// Tells the DNS resolver to pick up a freshly exported list.
#[async_trait::async_trait]
pub trait ResolverReload: Send + Sync {
    async fn reload(&self) -> anyhow::Result<()>;
}
