use clap::Parser;
use container_watchdog::cli::Cli;
use container_watchdog::config;
use container_watchdog::docker::BollardRuntimeClient;
use container_watchdog::logging;
use container_watchdog::watchdog::Watchdog;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (mut effective, source) = match config::load(cli.config.as_deref()) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    if let Some(socket) = &cli.docker_socket {
        effective.docker_socket = socket.clone();
    }
    if cli.log_level_debug {
        effective.verbose = true;
    }

    if cli.check_config {
        println!("config source: {source}");
        println!("{effective:#?}");
        return;
    }

    logging::init(effective.verbose);
    tracing::info!(source, containers = effective.containers.len(), "starting");

    let runtime = match BollardRuntimeClient::connect(&effective.docker_socket) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to container runtime");
            std::process::exit(1);
        }
    };

    let watchdog = Watchdog::new(effective, runtime, cli.config.clone());

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .expect("failed to install signal handler");

    shutdown_rx.recv().await;
    tracing::info!("signal received");
    watchdog.shutdown().await;
}
