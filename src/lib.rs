//! Blocklist aggregation for a DNS sinkhole.
//!
//! Registered remote lists are probed for freshness and re-downloaded only
//! when they changed. Their domains are merged, the whitelist is subtracted,
//! the blacklist is added back on top, and the result is written as a
//! hosts-style file for the resolver.

pub mod cli;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod export;
pub mod init;
pub mod reload;

pub use error::{GravityError, Result};
