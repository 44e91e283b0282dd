//! Command-line surface (SPEC_FULL.md A.4), mirroring the teacher's
//! `cli.rs` pattern of mapping flags onto the same fields the
//! environment-variable config surface already exposes.

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "container-watchdog", about = "Restarts unhealthy containers on a local runtime")]
pub struct Cli {
    /// Path to the JSON config file overlay (spec §6).
    #[arg(long, env = "WATCHDOG_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Overrides WATCHDOG_DOCKER_SOCKET / the file's dockerSocket.
    #[arg(long, env = "WATCHDOG_DOCKER_SOCKET_OVERRIDE")]
    pub docker_socket: Option<String>,

    /// Raises the default log filter to debug for this crate's own target.
    #[arg(long)]
    pub log_level_debug: bool,

    /// Loads and validates the effective configuration, prints it, and exits
    /// without starting the poller, event subscriber or status reporter.
    #[arg(long)]
    pub check_config: bool,
}
