use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use gravity::cli::{self, Args};
use gravity::config::Config;
use gravity::engine::{Gravity, HttpListClient, ResolverReload};
use gravity::init::{init_database, setup_logging};
use gravity::reload::DnsmasqReload;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load Config
    let config_exists = Path::new(&args.config).exists();
    let config = if config_exists {
        Config::load(&args.config).await?
    } else {
        Config::default()
    };

    // 2. Setup Logging
    setup_logging(&config);
    if !config_exists {
        info!("Config file {} not found, using defaults.", args.config);
    }

    // 3. Open Database
    let db = init_database(&config)?;

    // 4. Remote list client and resolver reload hook
    let client = HttpListClient::new(&config.updates.user_agent, config.request_timeout())
        .context("Failed to build HTTP client")?;
    let reload = config
        .resolver
        .reload
        .then(|| Arc::new(DnsmasqReload::new(&config.resolver.process)) as Arc<dyn ResolverReload>);

    let gravity = Gravity::new(config, db, Arc::new(client), reload)?;

    cli::execute(args.command, &gravity).await
}
