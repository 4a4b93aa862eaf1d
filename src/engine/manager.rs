use super::compiler::{compile_stores, Compilation};
use super::fetcher::{ConditionalFetcher, FetchOutcome};
use super::overrides::{OverrideKind, OverrideStore};
use super::sources::SourceStore;
use super::traits::{ListClient, ResolverReload};
use crate::config::Config;
use crate::db::DbClient;
use crate::error::Result;
use crate::export::HostsExporter;
use futures::{stream, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct SourceReport {
    pub uri: String,
    pub outcome: FetchOutcome,
}

/// Summary of one update run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// One entry per source, in registration order.
    pub sources: Vec<SourceReport>,
    pub raw_total: usize,
    pub compiled_len: usize,
}

impl RunReport {
    pub fn failures(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources
            .iter()
            .filter(|r| matches!(r.outcome, FetchOutcome::Failed { .. }))
    }
}

/// Ties the stores, fetcher, compiler and exporter into update runs.
pub struct Gravity {
    config: Config,
    db: Arc<DbClient>,
    sources: Arc<SourceStore>,
    overrides: OverrideStore,
    fetcher: ConditionalFetcher,
    exporter: HostsExporter,
    reload: Option<Arc<dyn ResolverReload>>,
}

impl Gravity {
    pub fn new(
        config: Config,
        db: Arc<DbClient>,
        client: Arc<dyn ListClient>,
        reload: Option<Arc<dyn ResolverReload>>,
    ) -> Result<Self> {
        let sources = Arc::new(SourceStore::load(db.clone())?);
        Ok(Self {
            exporter: HostsExporter::from_config(&config),
            overrides: OverrideStore::new(db.clone()),
            fetcher: ConditionalFetcher::new(client, sources.clone()),
            sources,
            db,
            config,
            reload,
        })
    }

    pub fn sources(&self) -> &SourceStore {
        &self.sources
    }

    pub fn overrides(&self) -> &OverrideStore {
        &self.overrides
    }

    /// Updates every source, then compiles, exports and reloads.
    ///
    /// A source that cannot be fetched keeps its last stored domains and is
    /// reported in [`RunReport::failures`]. Storage errors abort the run.
    pub async fn run(&self) -> Result<RunReport> {
        info!("Refreshing sources...");

        if self.config.updates.whitelist_source_hosts {
            self.whitelist_source_hosts()?;
        }

        let uris = self.sources.uris();
        let tasks = uris.into_iter().enumerate().map(|(idx, uri)| async move {
            let result = self.fetcher.run(&uri).await;
            (idx, uri, result)
        });

        let mut reports: Vec<(usize, SourceReport)> = stream::iter(tasks)
            .buffer_unordered(self.config.updates.concurrent_downloads.max(1))
            .map(|(idx, uri, result)| match result {
                Ok(outcome) => Ok((idx, SourceReport { uri, outcome })),
                Err(e) if e.is_fatal() => Err(e),
                Err(e) => {
                    error!(
                        uri = %uri,
                        error = %e,
                        "Source update failed, keeping previous domains"
                    );
                    let outcome = FetchOutcome::Failed {
                        error: e.to_string(),
                    };
                    Ok((idx, SourceReport { uri, outcome }))
                }
            })
            .try_collect()
            .await?;
        reports.sort_by_key(|(idx, _)| *idx);

        let compilation = self.compile_and_export().await?;

        Ok(RunReport {
            sources: reports.into_iter().map(|(_, r)| r).collect(),
            raw_total: compilation.raw_total,
            compiled_len: compilation.domains.len(),
        })
    }

    /// Recompiles from stored domains after an override change. No network
    /// traffic.
    pub async fn apply_overrides(&self) -> Result<Compilation> {
        self.compile_and_export().await
    }

    async fn compile_and_export(&self) -> Result<Compilation> {
        let compilation = compile_stores(&self.sources, &self.overrides)?;
        info!(
            "Compiled {} unique domains (from {} raw entries)",
            compilation.domains.len(),
            compilation.raw_total
        );

        self.db.store_compiled(&compilation.domains)?;
        self.exporter.write(&compilation.domains)?;
        self.signal_reload().await;
        Ok(compilation)
    }

    async fn signal_reload(&self) {
        if let Some(reload) = &self.reload {
            if let Err(e) = reload.reload().await {
                warn!("Failed to reload DNS resolver: {:#}", e);
            }
        }
    }

    /// List servers must stay resolvable for the next run.
    fn whitelist_source_hosts(&self) -> Result<()> {
        for uri in self.sources.uris() {
            match Url::parse(&uri).ok().and_then(|u| u.host_str().map(String::from)) {
                Some(host) => {
                    self.overrides.add(&host, OverrideKind::Whitelist)?;
                }
                None => warn!(uri = %uri, "Cannot determine host of source"),
            }
        }
        Ok(())
    }
}
