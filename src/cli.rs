use crate::engine::{FetchOutcome, Gravity, OverrideKind};
use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "gravity")]
#[command(about = "Aggregate ad-blocking lists into a DNS sinkhole list", long_about = None)]
pub struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "gravity.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download changed lists, compile and export the blocklist
    Update,
    /// Manage list sources
    Adlist {
        #[command(subcommand)]
        action: AdlistAction,
    },
    /// Manage domains that are never blocked
    Whitelist {
        #[command(subcommand)]
        action: OverrideAction,
    },
    /// Manage domains that are always blocked
    Blacklist {
        #[command(subcommand)]
        action: OverrideAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum AdlistAction {
    /// List registered sources
    List,
    /// Register one or more source URIs
    Add {
        #[arg(required = true)]
        uris: Vec<String>,
    },
    /// Remove one or more source URIs
    Remove {
        #[arg(required = true)]
        uris: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum OverrideAction {
    /// List the domains
    List,
    /// Add one or more domains
    Add {
        #[arg(required = true)]
        domains: Vec<String>,
        /// Recompile and reload even if nothing changed
        #[arg(short, long)]
        force: bool,
    },
    /// Remove one or more domains
    Remove {
        #[arg(required = true)]
        domains: Vec<String>,
        /// Recompile and reload even if nothing changed
        #[arg(short, long)]
        force: bool,
    },
}

pub async fn execute(command: Command, gravity: &Gravity) -> Result<()> {
    match command {
        Command::Update => update(gravity).await,
        Command::Adlist { action } => adlist(action, gravity),
        Command::Whitelist { action } => overrides(action, OverrideKind::Whitelist, gravity).await,
        Command::Blacklist { action } => overrides(action, OverrideKind::Blacklist, gravity).await,
    }
}

async fn update(gravity: &Gravity) -> Result<()> {
    let report = gravity.run().await?;

    let mut fetched = 0;
    let mut current = 0;
    for source in &report.sources {
        match &source.outcome {
            FetchOutcome::Fetched { .. } => fetched += 1,
            FetchOutcome::UpToDate => current += 1,
            FetchOutcome::Failed { .. } => {}
        }
    }

    println!(
        "{} unique domains from {} raw entries ({} downloaded, {} up to date)",
        report.compiled_len, report.raw_total, fetched, current
    );
    for failure in report.failures() {
        if let FetchOutcome::Failed { error } = &failure.outcome {
            println!("  failed: {} ({})", failure.uri, error);
        }
    }
    Ok(())
}

fn adlist(action: AdlistAction, gravity: &Gravity) -> Result<()> {
    let store = gravity.sources();
    let mut changed = false;

    match action {
        AdlistAction::List => {
            let sources = store.list();
            if sources.is_empty() {
                println!("You have no lists (that's a bad thing)!");
            }
            for (i, source) in sources.iter().enumerate() {
                println!("{}) {}", i + 1, source.uri);
            }
            return Ok(());
        }
        AdlistAction::Add { uris } => {
            for uri in uris {
                if store.register(&uri)? {
                    println!("Added {uri}");
                    changed = true;
                } else {
                    println!("This list is already added: {uri}");
                }
            }
        }
        AdlistAction::Remove { uris } => {
            for uri in uris {
                if store.remove(&uri)? {
                    println!("Removed {uri}");
                    changed = true;
                } else {
                    println!("This list is not in the list of lists: {uri}");
                }
            }
        }
    }

    if changed {
        println!("Run `gravity update` to refresh the blocklist");
    }
    Ok(())
}

async fn overrides(action: OverrideAction, kind: OverrideKind, gravity: &Gravity) -> Result<()> {
    let store = gravity.overrides();

    let (changed, force) = match action {
        OverrideAction::List => {
            let domains = store.list(kind)?;
            if domains.is_empty() {
                println!("Your {kind} is empty!");
            }
            for (i, domain) in domains.iter().enumerate() {
                println!("{}) {}", i + 1, domain);
            }
            return Ok(());
        }
        OverrideAction::Add { domains, force } => {
            let mut changed = false;
            for domain in domains {
                if store.add(&domain, kind)? {
                    println!("Added {domain} to the {kind}");
                    changed = true;
                } else {
                    println!("{domain} is already in the {kind}!");
                }
            }
            (changed, force)
        }
        OverrideAction::Remove { domains, force } => {
            let mut changed = false;
            for domain in domains {
                if store.remove(&domain, kind)? {
                    println!("Removed {domain} from the {kind}");
                    changed = true;
                } else {
                    println!("{domain} is not in the {kind}!");
                }
            }
            (changed, force)
        }
    };

    if changed || force {
        let compilation = gravity.apply_overrides().await?;
        println!("Blocklist recompiled: {} domains", compilation.domains.len());
    } else {
        println!("Blocklist has not been altered");
    }
    Ok(())
}
