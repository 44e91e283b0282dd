//! The periodic sweep (spec §4.3).
//!
//! Runs on a single timer. Each tick issues one `list` call scoped to the
//! currently-managed names, builds a `name -> summary` lookup, then drives
//! every target through the state machine. A single-slot coalesced wake
//! channel lets the event subscriber and imperative `resume` calls trigger
//! an out-of-cycle sweep without piling up redundant wakeups.

use crate::audit::AuditTrail;
use crate::config::EffectiveConfig;
use crate::docker::RuntimeClient;
use crate::executor::RestartExecutor;
use crate::registry::Registry;
use crate::state_machine::process_observation;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A coalesced wake signal: any number of sends between two receives collapse
/// into a single observed change, which is exactly what "trigger one extra
/// sweep soon" needs (spec §4.3, §4.4).
#[derive(Clone)]
pub struct WakeSender {
    tx: watch::Sender<u64>,
    counter: Arc<AtomicU64>,
}

impl WakeSender {
    pub fn wake(&self) {
        let next = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let _ = self.tx.send(next);
    }
}

pub fn wake_channel() -> (WakeSender, watch::Receiver<u64>) {
    let (tx, rx) = watch::channel(0);
    (
        WakeSender {
            tx,
            counter: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

pub struct Poller {
    registry: Arc<Registry>,
    runtime: Arc<dyn RuntimeClient>,
    executor: Arc<RestartExecutor>,
    audit: Arc<AuditTrail>,
    cancellation: CancellationToken,
}

impl Poller {
    pub fn new(
        registry: Arc<Registry>,
        runtime: Arc<dyn RuntimeClient>,
        executor: Arc<RestartExecutor>,
        audit: Arc<AuditTrail>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            registry,
            runtime,
            executor,
            audit,
            cancellation,
        }
    }

    /// Runs the sweep loop until cancelled. `config` is read fresh from
    /// `config_rx` at the top of every sweep so a hot reload of
    /// `poll_interval` or `containers` takes effect without restarting the
    /// poller task itself.
    pub async fn run(&self, mut config_rx: watch::Receiver<EffectiveConfig>, mut wake_rx: watch::Receiver<u64>) {
        // Immediate sweep before the first tick (spec §4.3).
        self.sweep_once(&config_rx.borrow()).await;

        loop {
            let interval = config_rx.borrow().poll_interval;
            tokio::select! {
                _ = self.cancellation.cancelled() => {
                    debug!("poller stopping");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
                result = wake_rx.changed() => {
                    if result.is_err() {
                        return;
                    }
                }
                result = config_rx.changed() => {
                    if result.is_err() {
                        return;
                    }
                    continue;
                }
            }
            let config = config_rx.borrow().clone();
            self.sweep_once(&config).await;
        }
    }

    async fn sweep_once(&self, config: &EffectiveConfig) {
        let names = self.registry.names();
        if names.is_empty() {
            return;
        }

        let listing = self
            .runtime
            .list(&names, Duration::from_secs(15))
            .await;

        let by_name: HashMap<String, crate::docker::ContainerSummary> = match listing {
            Ok(containers) => containers.into_iter().map(|c| (c.name.clone(), c)).collect(),
            Err(e) => {
                warn!(error = %e, "sweep listing failed, skipping this cycle");
                return;
            }
        };

        for name in names {
            let Some(state) = self.registry.lookup(&name) else {
                continue;
            };
            let summary = by_name.get(&name);
            process_observation(
                &name,
                &state,
                summary,
                config,
                &self.runtime,
                &self.executor,
                &self.audit,
                &self.cancellation,
            )
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::client::tests::MockRuntimeClient;
    use crate::docker::ContainerSummary;

    fn healthy(name: &str) -> ContainerSummary {
        ContainerSummary {
            id: "id".into(),
            name: name.into(),
            image: "img".into(),
            state: "running".into(),
            status: "Up".into(),
            health: None,
        }
    }

    #[tokio::test]
    async fn sweep_marks_targets_healthy_from_listing() {
        let registry = Arc::new(Registry::new(["a".to_string()]));
        let audit = Arc::new(AuditTrail::default());
        let mut mock = MockRuntimeClient::new();
        mock.expect_list()
            .returning(|_, _| Box::pin(async { Ok(vec![healthy("a")]) }));
        let runtime: Arc<dyn RuntimeClient> = Arc::new(mock);
        let executor = Arc::new(RestartExecutor::new(registry.clone(), runtime.clone(), audit.clone()));
        let cancellation = CancellationToken::new();
        let poller = Poller::new(registry.clone(), runtime, executor, audit, cancellation);

        poller.sweep_once(&EffectiveConfig::default()).await;

        let state = registry.lookup("a").unwrap();
        assert_eq!(state.snapshot().last_status, "running_no_healthcheck");
    }

    #[tokio::test]
    async fn sweep_with_no_managed_targets_skips_listing() {
        let registry = Arc::new(Registry::new(Vec::<String>::new()));
        let audit = Arc::new(AuditTrail::default());
        let mut mock = MockRuntimeClient::new();
        mock.expect_list().times(0);
        let runtime: Arc<dyn RuntimeClient> = Arc::new(mock);
        let executor = Arc::new(RestartExecutor::new(registry.clone(), runtime.clone(), audit.clone()));
        let poller = Poller::new(registry, runtime, executor, audit, CancellationToken::new());

        poller.sweep_once(&EffectiveConfig::default()).await;
    }
}
