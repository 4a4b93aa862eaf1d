use super::sources::DomainSet;
use crate::db::DbClient;
use crate::error::{GravityError, Result};
use std::fmt;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverrideKind {
    Whitelist,
    Blacklist,
}

impl OverrideKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Whitelist => "whitelist",
            Self::Blacklist => "blacklist",
        }
    }
}

impl fmt::Display for OverrideKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted whitelist and blacklist entries.
///
/// Every mutation is committed before the call returns.
pub struct OverrideStore {
    db: Arc<DbClient>,
}

impl OverrideStore {
    pub fn new(db: Arc<DbClient>) -> Self {
        Self { db }
    }

    /// Returns `false` if `domain` was already listed under `kind`.
    pub fn add(&self, domain: &str, kind: OverrideKind) -> Result<bool> {
        let domain = normalize(domain)?;
        let added = self.db.insert_override(domain, kind)?;
        if added {
            info!(domain = %domain, list = %kind, "Added override");
        }
        Ok(added)
    }

    /// Returns `false` if `domain` was not listed under `kind`.
    pub fn remove(&self, domain: &str, kind: OverrideKind) -> Result<bool> {
        let domain = normalize(domain)?;
        let removed = self.db.delete_override(domain, kind)?;
        if removed {
            info!(domain = %domain, list = %kind, "Removed override");
        }
        Ok(removed)
    }

    pub fn contains(&self, domain: &str, kind: OverrideKind) -> Result<bool> {
        Ok(self.db.has_override(domain.trim(), kind)?)
    }

    /// Entries of `kind` in insertion order.
    pub fn list(&self, kind: OverrideKind) -> Result<Vec<String>> {
        Ok(self.db.load_overrides(kind)?)
    }

    pub fn domain_set(&self, kind: OverrideKind) -> Result<DomainSet> {
        Ok(self.list(kind)?.into_iter().collect())
    }
}

fn normalize(domain: &str) -> Result<&str> {
    let trimmed = domain.trim();
    if trimmed.is_empty() {
        return Err(GravityError::InvalidDomain {
            domain: domain.to_string(),
        });
    }
    Ok(trimmed)
}
