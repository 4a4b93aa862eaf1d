//! Initialization helpers for the application startup.

use crate::config::Config;
use crate::db::DbClient;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Sets up the tracing subscriber with the configured filters.
pub fn setup_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = config.logging.level.clone();

        // Suppress connection pool chatter unless explicitly enabled
        if !filter.contains("hyper") {
            filter.push_str(",hyper_util=warn");
        }

        tracing_subscriber::EnvFilter::new(filter)
    });

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Opens the database, creating the schema on first use.
///
/// A freshly created database gets the configured seed sources registered in
/// order.
pub fn init_database(config: &Config) -> Result<Arc<DbClient>> {
    let db = DbClient::new(config.database_path.clone())
        .with_context(|| format!("Failed to open database {}", config.database_path))?;

    let created = db
        .initialize()
        .context("Failed to initialize database schema")?;

    if created {
        info!(
            "New database, registering {} seed sources",
            config.seed_sources.len()
        );
        for uri in &config.seed_sources {
            db.insert_source(uri)
                .with_context(|| format!("Failed to register seed source {uri}"))?;
        }
    }

    Ok(Arc::new(db))
}
