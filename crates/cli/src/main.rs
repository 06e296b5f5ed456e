//! `opm` — loads a YAML configuration document (§6), wires up pools,
//! scansets, and IRC presences, and runs until killed. Grounded on
//! `original_source/opm/conf.py`'s `Options`/`makeService` and `vajra`'s
//! cli crate's `args.rs`/`main.rs` split.

mod args;
mod bootstrap;
mod config;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use args::Cli;
use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    opm_telemetry::init_logging(cli.verbose);

    let config = Config::load(&cli.conffile)
        .with_context(|| format!("loading {}", cli.conffile.display()))?;

    if !cli.force_limits {
        bootstrap::check_fd_limit(&config)?;
    }
    if cli.force_select {
        tracing::debug!("--force-select has no effect: tokio's scheduler has no reactor choice to accept");
    }

    let resolver = bootstrap::build_resolver(cli.keep_resolver)?;
    let pools = bootstrap::build_pools(&config);
    let scansets = bootstrap::build_scansets(&config)?;
    let env = bootstrap::build_environment(&config, std::sync::Arc::clone(&resolver));
    let manager = std::sync::Arc::new(opm_engine::ScanManager::new(pools, scansets, env));

    let presences = bootstrap::build_presences(&config, manager, resolver, cli.irc_log)?;
    if presences.is_empty() {
        anyhow::bail!("no irc networks configured");
    }

    info!(networks = presences.len(), "starting");
    let mut tasks = Vec::with_capacity(presences.len());
    for presence in presences {
        tasks.push(tokio::spawn(presence.run()));
    }
    for task in tasks {
        task.await?;
    }

    Ok(())
}
