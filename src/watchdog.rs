//! The top-level orchestrator: assembles the registry, poller, optional
//! event subscriber, executor, audit trail and command surface into one
//! running watchdog, and owns the shutdown sequence (spec §4, §9).

use crate::audit::AuditTrail;
use crate::commands::CommandSurface;
use crate::config::EffectiveConfig;
use crate::docker::RuntimeClient;
use crate::events::EventSubscriber;
use crate::executor::RestartExecutor;
use crate::poller::{wake_channel, Poller};
use crate::registry::Registry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The amount of time the shutdown sequence waits for in-flight work
/// (poller sweep, event subscriber unwind) to finish before giving up and
/// returning anyway. Restarts already in flight are bounded by their own
/// deadline and are not waited on here (spec §9).
const SHUTDOWN_DRAIN_DEADLINE: Duration = Duration::from_secs(5);

pub struct Watchdog {
    pub registry: Arc<Registry>,
    pub audit: Arc<AuditTrail>,
    pub commands: Arc<CommandSurface>,
    config_tx: watch::Sender<EffectiveConfig>,
    cancellation: CancellationToken,
    tasks: tokio::task::JoinSet<()>,
}

impl Watchdog {
    pub fn new(
        initial_config: EffectiveConfig,
        runtime: Arc<dyn RuntimeClient>,
        config_path: Option<PathBuf>,
    ) -> Self {
        let registry = Arc::new(Registry::new(initial_config.containers.clone()));
        let audit = Arc::new(AuditTrail::default());
        let executor = Arc::new(RestartExecutor::new(registry.clone(), runtime.clone(), audit.clone()));
        let (config_tx, config_rx) = watch::channel(initial_config.clone());
        let cancellation = CancellationToken::new();
        let (wake, wake_rx) = wake_channel();
        let commands = Arc::new(CommandSurface::new(
            registry.clone(),
            runtime.clone(),
            executor.clone(),
            audit.clone(),
            config_tx.clone(),
            config_path,
            wake.clone(),
        ));

        let mut tasks = tokio::task::JoinSet::new();

        let poller = Poller::new(
            registry.clone(),
            runtime.clone(),
            executor.clone(),
            audit.clone(),
            cancellation.clone(),
        );
        let poller_config_rx = config_rx.clone();
        tasks.spawn(async move {
            poller.run(poller_config_rx, wake_rx).await;
        });

        if initial_config.use_events {
            let subscriber = EventSubscriber::new(runtime.clone(), wake.clone(), cancellation.clone());
            let sub_registry = registry.clone();
            let sub_config_rx = config_rx.clone();
            tasks.spawn(async move {
                subscriber.run(move || sub_registry.names(), sub_config_rx).await;
            });
        }

        let status_audit = audit.clone();
        let status_registry = registry.clone();
        let mut status_config_rx = config_rx.clone();
        let status_cancellation = cancellation.clone();
        tasks.spawn(async move {
            loop {
                let interval = status_config_rx.borrow().status_report_interval;
                if interval.is_zero() {
                    // statusReportSeconds=0 disables emission (spec §8): park
                    // on cancellation or a config change rather than busy-
                    // spinning on a zero-length sleep.
                    tokio::select! {
                        _ = status_cancellation.cancelled() => return,
                        result = status_config_rx.changed() => {
                            if result.is_err() {
                                return;
                            }
                        }
                    }
                    continue;
                }

                tokio::select! {
                    _ = status_cancellation.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                    result = status_config_rx.changed() => {
                        if result.is_err() {
                            return;
                        }
                        continue;
                    }
                }
                let snapshot = status_registry.snapshot_all();
                let unhealthy = snapshot.iter().filter(|t| t.fields.failures > 0).count();
                info!(managed = snapshot.len(), unhealthy, "status_report");
                status_audit.record(crate::audit::AuditEvent {
                    at: std::time::SystemTime::now(),
                    action: "status_report".to_string(),
                    target: "global".to_string(),
                    by: crate::registry::RestartBy::Auto,
                    requested_by: "watchdog".to_string(),
                    reason: format!("managed={} unhealthy={unhealthy}", snapshot.len()),
                    result: "ok".to_string(),
                    error: None,
                });
            }
        });

        Self {
            registry,
            audit,
            commands,
            config_tx,
            cancellation,
            tasks,
        }
    }

    pub fn config_sender(&self) -> watch::Sender<EffectiveConfig> {
        self.config_tx.clone()
    }

    /// Requests cancellation of every background task and waits up to
    /// [`SHUTDOWN_DRAIN_DEADLINE`] for them to finish.
    pub async fn shutdown(mut self) {
        info!("shutting_down");
        self.cancellation.cancel();

        let drained = tokio::time::timeout(SHUTDOWN_DRAIN_DEADLINE, async {
            while self.tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                deadline_secs = SHUTDOWN_DRAIN_DEADLINE.as_secs(),
                "shutdown_timeout"
            );
        } else {
            info!("shutdown_complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::client::tests::MockRuntimeClient;

    #[tokio::test]
    async fn zero_status_report_interval_disables_emission() {
        let mut config = EffectiveConfig::default();
        config.containers = Vec::new();
        config.use_events = false;
        config.status_report_interval = Duration::ZERO;

        let runtime: Arc<dyn RuntimeClient> = Arc::new(MockRuntimeClient::new());
        let watchdog = Watchdog::new(config, runtime, None);

        // A busy-spinning reporter would have flooded the audit trail with
        // `status_report` entries well before this deadline.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(watchdog.audit.snapshot(200).is_empty());

        watchdog.shutdown().await;
    }
}
