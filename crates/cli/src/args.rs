//! CLI surface (§6 "CLI"). Grounded on `vajra`'s `args.rs`, reshaped from a
//! subcommand-per-scan-mode CLI to the single-config-file-plus-flags shape
//! `original_source/opm/conf.py`'s `Options` class uses.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "opm")]
#[command(version)]
#[command(about = "Open-proxy monitor: IRC presence + scan engine", long_about = None)]
pub struct Cli {
    /// Path to the YAML configuration document.
    pub conffile: PathBuf,

    /// Accept a suboptimal reactor/runtime choice without complaint.
    #[arg(long)]
    pub force_select: bool,

    /// Do not install a dedicated async resolver; use the OS default.
    #[arg(long)]
    pub keep_resolver: bool,

    /// Skip the startup check that the FD soft limit covers every pool.
    #[arg(long)]
    pub force_limits: bool,

    /// Log every raw IRC line, inbound and outbound.
    #[arg(long)]
    pub irc_log: bool,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
