use super::parser::parse_domains;
use super::sources::{Source, SourceStore};
use super::traits::{Download, Freshness, ListClient};
use crate::error::{GravityError, Result};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, ETAG, LAST_MODIFIED};
use reqwest::Client;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// HTTP(S) implementation of [`ListClient`].
pub struct HttpListClient {
    client: Client,
}

impl HttpListClient {
    /// `timeout` bounds each probe and each download as a whole.
    pub fn new(user_agent: &str, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .user_agent(user_agent)
                .timeout(timeout)
                .build()?,
        })
    }

    fn freshness(headers: &HeaderMap) -> Freshness {
        let etag = headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from);
        let last_modified = headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);
        Freshness {
            etag,
            last_modified,
        }
    }
}

#[async_trait::async_trait]
impl ListClient for HttpListClient {
    async fn probe(&self, uri: &str) -> Result<Freshness> {
        let resp = self
            .client
            .head(uri)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|source| network(uri, source))?;
        Ok(Self::freshness(resp.headers()))
    }

    async fn download(&self, uri: &str) -> Result<Download> {
        let resp = self
            .client
            .get(uri)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|source| network(uri, source))?;
        let freshness = Self::freshness(resp.headers());
        let text = resp.text().await.map_err(|source| network(uri, source))?;

        Ok(Download {
            domains: parse_domains(&text).map(String::from).collect(),
            freshness,
        })
    }
}

fn network(uri: &str, source: reqwest::Error) -> GravityError {
    GravityError::Network {
        uri: uri.to_string(),
        source,
    }
}

/// Parses an HTTP-date (`Sun, 06 Nov 1994 08:49:37 GMT`).
///
/// Empty values and placeholders such as `0` yield `None`.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Why a source was downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Nothing stored yet.
    NeverFetched,
    EtagChanged,
    NewerLastModified,
    /// The probe failed or carried no usable header.
    Unknown,
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NeverFetched => "new list",
            Self::EtagChanged => "entity tag changed",
            Self::NewerLastModified => "newer modification date",
            Self::Unknown => "no modification date found",
        })
    }
}

/// Terminal state of one source's update cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched { domains: usize, reason: Staleness },
    UpToDate,
    /// Set by the orchestrator when the cycle hit a non-fatal error.
    Failed { error: String },
}

/// Decides whether `source` must be downloaded given a probe result.
/// Returns `None` when the stored copy is current.
pub fn staleness(source: &Source, probe: &Freshness) -> Option<Staleness> {
    if let Some(etag) = &probe.etag {
        if source.etag.as_ref() != Some(etag) {
            return Some(Staleness::EtagChanged);
        }
    }
    if let Some(remote) = probe.last_modified {
        if source.last_modified.map_or(true, |stored| remote > stored) {
            return Some(Staleness::NewerLastModified);
        }
    }
    if probe.is_empty() {
        return Some(Staleness::Unknown);
    }
    None
}

/// Runs the probe/download cycle for single sources.
pub struct ConditionalFetcher {
    client: Arc<dyn ListClient>,
    store: Arc<SourceStore>,
}

impl ConditionalFetcher {
    pub fn new(client: Arc<dyn ListClient>, store: Arc<SourceStore>) -> Self {
        Self { client, store }
    }

    /// Brings `uri` up to date.
    ///
    /// A failed probe counts as "freshness unknown" and leads to a download.
    /// A failed download returns the error and leaves the stored source as it
    /// was.
    pub async fn run(&self, uri: &str) -> Result<FetchOutcome> {
        let source = self.store.get(uri).ok_or_else(|| GravityError::NotFound {
            what: format!("source {uri}"),
        })?;

        let (reason, probe) = if self.store.raw_domains(uri)?.is_empty() {
            info!(uri = %uri, "New list, downloading...");
            (Staleness::NeverFetched, Freshness::default())
        } else {
            let probe = match self.client.probe(uri).await {
                Ok(probe) => probe,
                Err(e) => {
                    warn!(uri = %uri, error = %e, "Freshness probe failed, assuming stale");
                    Freshness::default()
                }
            };
            match staleness(&source, &probe) {
                Some(reason) => {
                    info!(uri = %uri, reason = %reason, "Update found, downloading...");
                    (reason, probe)
                }
                None => {
                    info!(uri = %uri, "No update");
                    return Ok(FetchOutcome::UpToDate);
                }
            }
        };

        let download = self.client.download(uri).await?;
        if download.domains.is_empty() {
            warn!(uri = %uri, "No domains could be extracted from list");
        }

        let etag = download.freshness.etag.or(probe.etag).or(source.etag);
        let last_modified = download
            .freshness
            .last_modified
            .or(probe.last_modified)
            .or(source.last_modified);

        let domains = self
            .store
            .replace_domains(uri, download.domains, last_modified, etag)?;
        info!(uri = %uri, domains, "Downloaded");

        Ok(FetchOutcome::Fetched { domains, reason })
    }
}
