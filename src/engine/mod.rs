mod compiler;
mod fetcher;
mod manager;
mod overrides;
pub mod parser;
mod sources;
mod traits;

pub use compiler::{compile, compile_stores, Compilation, CompiledSet};
pub use fetcher::{
    parse_http_date, staleness, ConditionalFetcher, FetchOutcome, HttpListClient, Staleness,
};
pub use manager::{Gravity, RunReport, SourceReport};
pub use overrides::{OverrideKind, OverrideStore};
pub use sources::{DomainSet, Source, SourceStore};
pub use traits::{Download, Freshness, ListClient, ResolverReload};
