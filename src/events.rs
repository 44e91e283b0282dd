//! The optional event subscriber (spec §4.4).
//!
//! Subscribes to the runtime's event stream filtered to the managed names,
//! rate-limits how often it nudges the poller awake (`event_min_interval`
//! is a minimum spacing, not a sampling window: every event is observed,
//! only the wake is throttled), and reconnects with a fixed backoff if the
//! stream ends or errors.

use crate::config::EffectiveConfig;
use crate::docker::{RuntimeClient, RuntimeEventKind};
use crate::poller::WakeSender;
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

pub struct EventSubscriber {
    runtime: Arc<dyn RuntimeClient>,
    wake: WakeSender,
    cancellation: CancellationToken,
}

impl EventSubscriber {
    pub fn new(runtime: Arc<dyn RuntimeClient>, wake: WakeSender, cancellation: CancellationToken) -> Self {
        Self {
            runtime,
            wake,
            cancellation,
        }
    }

    /// Runs until cancelled. Only active while `config.use_events` is true
    /// at the moment the watchdog assembles its task set (spec §4.8: the
    /// disabled -> enabled transition requires a restart to spawn this task
    /// at all; this loop does not itself poll the flag).
    pub async fn run(&self, registry_names: impl Fn() -> Vec<String>, config_rx: watch::Receiver<EffectiveConfig>) {
        let mut last_wake: Option<Instant> = None;

        loop {
            if self.cancellation.is_cancelled() {
                return;
            }

            let names = registry_names();
            let mut stream = self.runtime.events(&names);
            info!("event subscriber connected");

            loop {
                let next = tokio::select! {
                    _ = self.cancellation.cancelled() => return,
                    item = stream.next() => item,
                };

                let Some(item) = next else {
                    warn!("event stream ended, reconnecting");
                    break;
                };

                let event = match item {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "event stream error, reconnecting");
                        break;
                    }
                };

                if !matches!(
                    event.kind,
                    RuntimeEventKind::Die
                        | RuntimeEventKind::HealthStatus
                        | RuntimeEventKind::Restart
                        | RuntimeEventKind::Start
                        | RuntimeEventKind::Stop
                ) {
                    continue;
                }

                let min_interval = config_rx.borrow().event_min_interval;
                let now = Instant::now();
                let should_wake = match last_wake {
                    None => true,
                    Some(last) => now.duration_since(last) >= min_interval,
                };
                if should_wake {
                    debug!(container = %event.container_name, kind = ?event.kind, "event triggered wake");
                    self.wake.wake();
                    last_wake = Some(now);
                } else {
                    debug!(container = %event.container_name, "event suppressed by rate limit");
                }
            }

            tokio::select! {
                _ = self.cancellation.cancelled() => return,
                _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::client::tests::MockRuntimeClient;
    use crate::docker::RuntimeEvent;
    use futures::stream;

    #[tokio::test]
    async fn relevant_event_triggers_wake() {
        let mut mock = MockRuntimeClient::new();
        mock.expect_events().returning(|_| {
            Box::pin(stream::iter(vec![Ok(RuntimeEvent {
                kind: RuntimeEventKind::Die,
                container_name: "a".to_string(),
            })]))
        });
        let runtime: Arc<dyn RuntimeClient> = Arc::new(mock);
        let (wake, mut wake_rx) = crate::poller::wake_channel();
        let cancellation = CancellationToken::new();
        let (_config_tx, config_rx) = watch::channel(EffectiveConfig::default());

        let subscriber = EventSubscriber::new(runtime, wake, cancellation.clone());
        let handle = tokio::spawn(async move {
            subscriber.run(|| vec!["a".to_string()], config_rx).await;
        });

        tokio::time::timeout(Duration::from_millis(200), wake_rx.changed())
            .await
            .expect("expected a wake before timeout")
            .unwrap();

        cancellation.cancel();
        let _ = tokio::time::timeout(Duration::from_millis(200), handle).await;
    }

    #[tokio::test]
    async fn rate_limiter_suppresses_second_wake_within_min_interval() {
        let mut mock = MockRuntimeClient::new();
        mock.expect_events().returning(|_| {
            Box::pin(stream::iter(vec![
                Ok(RuntimeEvent {
                    kind: RuntimeEventKind::Die,
                    container_name: "a".to_string(),
                }),
                Ok(RuntimeEvent {
                    kind: RuntimeEventKind::Die,
                    container_name: "a".to_string(),
                }),
            ]))
        });
        let runtime: Arc<dyn RuntimeClient> = Arc::new(mock);
        let (wake, mut wake_rx) = crate::poller::wake_channel();
        let cancellation = CancellationToken::new();
        let mut cfg = EffectiveConfig::default();
        cfg.event_min_interval = Duration::from_secs(60);
        let (_config_tx, config_rx) = watch::channel(cfg);

        let subscriber = EventSubscriber::new(runtime, wake, cancellation.clone());
        let handle = tokio::spawn(async move {
            subscriber.run(|| vec!["a".to_string()], config_rx).await;
        });

        tokio::time::timeout(Duration::from_millis(200), wake_rx.changed())
            .await
            .expect("expected the first event to wake")
            .unwrap();

        // The second event arrives well within `event_min_interval`, so it
        // must not produce a further change on the wake channel.
        let result = tokio::time::timeout(Duration::from_millis(100), wake_rx.changed()).await;
        assert!(result.is_err(), "second event within the rate-limit window must not wake again");

        cancellation.cancel();
        let _ = tokio::time::timeout(Duration::from_millis(200), handle).await;
    }
}
