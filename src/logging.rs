//! Logging initialization (spec SPEC_FULL.md A.1).
//!
//! `RUST_LOG` always wins if set; otherwise the `verbose` config flag
//! raises the crate's own target to `debug` while leaving dependencies at
//! their default `info`/`warn` level.

use tracing_subscriber::EnvFilter;

pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("container_watchdog={level},warn"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_target(true)
        .init();
}
