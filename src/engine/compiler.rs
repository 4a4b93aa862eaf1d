//! Override resolution over the union of all source domain sets.

use super::overrides::{OverrideKind, OverrideStore};
use super::sources::{DomainSet, SourceStore};
use crate::error::Result;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Final blocked domain set. Ordered so exports are deterministic.
pub type CompiledSet = BTreeSet<String>;

/// `(⋃ sources − whitelist) ∪ blacklist`.
///
/// The blacklist is applied last: a domain in both override lists is blocked.
pub fn compile<'a>(
    sources: impl IntoIterator<Item = &'a DomainSet>,
    whitelist: &DomainSet,
    blacklist: &DomainSet,
) -> CompiledSet {
    let mut compiled = CompiledSet::new();
    for domains in sources {
        compiled.extend(
            domains
                .iter()
                .filter(|d| !whitelist.contains(d.as_str()))
                .cloned(),
        );
    }
    compiled.extend(blacklist.iter().cloned());
    compiled
}

/// Inputs and output of one compilation, kept for reporting.
#[derive(Debug)]
pub struct Compilation {
    /// Sum of every source's contribution before cross-source dedup.
    pub raw_total: usize,
    pub domains: CompiledSet,
}

/// Reads the current state of both stores and compiles it.
pub fn compile_stores(sources: &SourceStore, overrides: &OverrideStore) -> Result<Compilation> {
    let sets: Vec<Arc<DomainSet>> = sources
        .uris()
        .iter()
        .map(|uri| sources.raw_domains(uri))
        .collect::<Result<_>>()?;
    let whitelist = overrides.domain_set(OverrideKind::Whitelist)?;
    let blacklist = overrides.domain_set(OverrideKind::Blacklist)?;

    Ok(Compilation {
        raw_total: sets.iter().map(|s| s.len()).sum(),
        domains: compile(sets.iter().map(|s| &**s), &whitelist, &blacklist),
    })
}
