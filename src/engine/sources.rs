use crate::db::DbClient;
use crate::error::{GravityError, Result};
use chrono::{DateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info};

/// Deduplicated domains contributed by one source.
pub type DomainSet = FxHashSet<String>;

/// A registered remote list and what we last learned about its freshness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub uri: String,
    /// `None` until a fetch observed a `Last-Modified` header.
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

/// Registry of sources plus an in-memory snapshot of their domain sets.
///
/// The source list is read once at [`load`](Self::load) and kept in sync by
/// the mutating methods. Domain sets are read from the database the first
/// time they are asked for and cached until [`reload`](Self::reload).
pub struct SourceStore {
    db: Arc<DbClient>,
    sources: RwLock<Vec<Source>>,
    domains: Mutex<FxHashMap<String, Arc<DomainSet>>>,
}

impl SourceStore {
    pub fn load(db: Arc<DbClient>) -> Result<Self> {
        let sources = db.load_sources()?;
        debug!("Loaded {} registered sources", sources.len());
        Ok(Self {
            db,
            sources: RwLock::new(sources),
            domains: Mutex::new(FxHashMap::default()),
        })
    }

    /// Drops every cached value and re-reads the source list.
    pub fn reload(&self) -> Result<()> {
        let sources = self.db.load_sources()?;
        *self.sources.write().unwrap_or_else(PoisonError::into_inner) = sources;
        self.domains
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    /// Adds `uri` with empty freshness metadata. Returns `false` if it was
    /// already registered.
    pub fn register(&self, uri: &str) -> Result<bool> {
        if !self.db.insert_source(uri)? {
            return Ok(false);
        }
        self.sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Source {
                uri: uri.to_string(),
                last_modified: None,
                etag: None,
            });
        info!(uri = %uri, "Registered source");
        Ok(true)
    }

    /// Deletes `uri` and its domains. Returns `false` if it was not registered.
    pub fn remove(&self, uri: &str) -> Result<bool> {
        if !self.db.delete_source(uri)? {
            return Ok(false);
        }
        self.sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|s| s.uri != uri);
        self.domains
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uri);
        info!(uri = %uri, "Removed source");
        Ok(true)
    }

    /// Sources in registration order.
    pub fn list(&self) -> Vec<Source> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, uri: &str) -> Option<Source> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|s| s.uri == uri)
            .cloned()
    }

    pub fn uris(&self) -> Vec<String> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| s.uri.clone())
            .collect()
    }

    /// Domain set of `uri`, loaded from the database on first access.
    pub fn raw_domains(&self, uri: &str) -> Result<Arc<DomainSet>> {
        if let Some(set) = self
            .domains
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
        {
            return Ok(Arc::clone(set));
        }

        if self.get(uri).is_none() {
            return Err(GravityError::NotFound {
                what: format!("source {uri}"),
            });
        }

        let set: DomainSet = self.db.load_source_domains(uri)?.into_iter().collect();
        debug!(uri = %uri, domains = set.len(), "Loaded source domains");

        let mut cache = self.domains.lock().unwrap_or_else(PoisonError::into_inner);
        let set = cache
            .entry(uri.to_string())
            .or_insert_with(|| Arc::new(set));
        Ok(Arc::clone(set))
    }

    /// Replaces the domains and freshness metadata of `uri`.
    ///
    /// Either everything is persisted or nothing is: on error the stored and
    /// cached state of the source are unchanged.
    pub fn replace_domains(
        &self,
        uri: &str,
        new_domains: impl IntoIterator<Item = String>,
        last_modified: Option<DateTime<Utc>>,
        etag: Option<String>,
    ) -> Result<usize> {
        let mut set = DomainSet::default();
        let domains: Vec<String> = new_domains
            .into_iter()
            .filter(|d| set.insert(d.clone()))
            .collect();

        if !self
            .db
            .replace_source_domains(uri, &domains, last_modified, etag.as_deref())?
        {
            return Err(GravityError::NotFound {
                what: format!("source {uri}"),
            });
        }

        let count = set.len();
        if let Some(source) = self
            .sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .iter_mut()
            .find(|s| s.uri == uri)
        {
            source.last_modified = last_modified;
            source.etag = etag;
        }
        self.domains
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri.to_string(), Arc::new(set));

        Ok(count)
    }
}
