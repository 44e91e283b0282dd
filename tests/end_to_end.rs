//! End-to-end scenarios against a mocked runtime client, no Docker needed.

use container_watchdog::audit::AuditTrail;
use container_watchdog::commands::{CommandResult, CommandSurface};
use container_watchdog::config::EffectiveConfig;
use container_watchdog::docker::client::tests::MockRuntimeClient;
use container_watchdog::docker::{ContainerSummary, RuntimeClient};
use container_watchdog::executor::{RestartExecutor, RestartOutcome, RestartRequest};
use container_watchdog::poller::{wake_channel, Poller};
use container_watchdog::registry::{Registry, RestartBy};
use container_watchdog::state_machine::process_observation;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn summary(name: &str, state: &str, health: Option<&str>) -> ContainerSummary {
    ContainerSummary {
        id: "id".into(),
        name: name.into(),
        image: "img".into(),
        state: state.into(),
        status: "Up".into(),
        health: health.map(String::from),
    }
}

/// Scenario: a steady-state healthy container is swept repeatedly and
/// never accumulates failures or triggers a restart.
#[tokio::test]
async fn healthy_steady_state_never_restarts() {
    let registry = Arc::new(Registry::new(["web".to_string()]));
    let audit = Arc::new(AuditTrail::default());
    let mut mock = MockRuntimeClient::new();
    mock.expect_list()
        .returning(|_, _| Box::pin(async { Ok(vec![summary("web", "running", Some("healthy"))]) }));
    mock.expect_restart().times(0);
    let runtime: Arc<dyn RuntimeClient> = Arc::new(mock);
    let executor = Arc::new(RestartExecutor::new(registry.clone(), runtime.clone(), audit.clone()));
    let cancellation = CancellationToken::new();
    let poller = Poller::new(registry.clone(), runtime, executor, audit, cancellation);
    let config = EffectiveConfig::default();

    for _ in 0..5 {
        poller.sweep_once(&config).await;
    }

    assert_eq!(registry.lookup("web").unwrap().snapshot().failures, 0);
}

/// Scenario: a container that stays unhealthy across the threshold and
/// every retry probe eventually gets restarted exactly once.
#[tokio::test]
async fn persistent_failure_escalates_to_restart() {
    let registry = Arc::new(Registry::new(["web".to_string()]));
    let state = registry.lookup("web").unwrap();
    let audit = Arc::new(AuditTrail::default());

    let mut mock = MockRuntimeClient::new();
    mock.expect_list()
        .returning(|_, _| Box::pin(async { Ok(vec![]) }));
    mock.expect_restart()
        .times(1)
        .returning(|_, _| Box::pin(async { Ok(()) }));
    let runtime: Arc<dyn RuntimeClient> = Arc::new(mock);

    let executor = Arc::new(RestartExecutor::new(registry.clone(), runtime.clone(), audit.clone()));
    let cancellation = CancellationToken::new();
    let mut config = EffectiveConfig::default();
    config.max_failures = 2;
    config.retry_checks = 1;
    config.retry_interval = Duration::from_millis(1);

    // First observation: not found, one failure recorded.
    process_observation("web", &state, None, &config, &runtime, &executor, &audit, &cancellation).await;
    assert_eq!(state.snapshot().failures, 1);

    // Second observation crosses max_failures and runs the retry verifier,
    // which also observes nothing, then escalates.
    process_observation("web", &state, None, &config, &runtime, &executor, &audit, &cancellation).await;

    tokio::time::sleep(Duration::from_millis(30)).await;
    let events: Vec<_> = audit.snapshot(50).into_iter().map(|e| e.action).collect();
    assert!(events.contains(&"restart_ok".to_string()));
}

/// Scenario: the container recovers mid-retry-verification, so no restart
/// is ever issued.
#[tokio::test]
async fn recovery_during_retry_aborts_escalation() {
    let registry = Arc::new(Registry::new(["web".to_string()]));
    let state = registry.lookup("web").unwrap();
    state.with_fields(|f| f.failures = 1);
    let audit = Arc::new(AuditTrail::default());

    let mut mock = MockRuntimeClient::new();
    mock.expect_list()
        .returning(|_, _| Box::pin(async { Ok(vec![summary("web", "running", Some("healthy"))]) }));
    mock.expect_restart().times(0);
    let runtime: Arc<dyn RuntimeClient> = Arc::new(mock);

    let executor = Arc::new(RestartExecutor::new(registry.clone(), runtime.clone(), audit.clone()));
    let cancellation = CancellationToken::new();
    let mut config = EffectiveConfig::default();
    config.max_failures = 2;
    config.retry_checks = 2;
    config.retry_interval = Duration::from_millis(1);

    process_observation("web", &state, None, &config, &runtime, &executor, &audit, &cancellation).await;

    assert_eq!(state.snapshot().failures, 0);
    let events: Vec<_> = audit.snapshot(50).into_iter().map(|e| e.action).collect();
    assert!(events.contains(&"recover_during_retry".to_string()));
}

/// Scenario: a manual force-restart bypasses an active cooldown.
#[tokio::test]
async fn manual_force_restart_bypasses_cooldown() {
    let registry = Arc::new(Registry::new(["web".to_string()]));
    registry
        .lookup("web")
        .unwrap()
        .with_fields(|f| f.cooldown_until = Some(std::time::SystemTime::now() + Duration::from_secs(120)));
    let audit = Arc::new(AuditTrail::default());

    let mut mock = MockRuntimeClient::new();
    mock.expect_restart()
        .times(1)
        .returning(|_, _| Box::pin(async { Ok(()) }));
    let runtime: Arc<dyn RuntimeClient> = Arc::new(mock);
    let executor = Arc::new(RestartExecutor::new(registry.clone(), runtime.clone(), audit.clone()));
    let (config_tx, _rx) = tokio::sync::watch::channel(EffectiveConfig::default());
    let (wake, _wake_rx) = wake_channel();
    let surface = CommandSurface::new(registry, runtime, executor, audit, config_tx, None, wake);

    assert_eq!(surface.force_restart("web", "operator"), CommandResult::Ok);
}

/// Scenario: two concurrent manual restart requests for the same target —
/// only the first is accepted, the second is rejected as in-progress.
#[tokio::test]
async fn concurrent_manual_restart_is_rejected() {
    let registry = Arc::new(Registry::new(["web".to_string()]));
    let audit = Arc::new(AuditTrail::default());

    let mut mock = MockRuntimeClient::new();
    mock.expect_restart()
        .times(1)
        .returning(|_, _| Box::pin(async { Ok(()) }));
    let runtime: Arc<dyn RuntimeClient> = Arc::new(mock);
    let executor = RestartExecutor::new(registry.clone(), runtime, audit);

    let request = |force| RestartRequest {
        target: "web".to_string(),
        by: RestartBy::Manual,
        reason: "operator".to_string(),
        requested_by: "op".to_string(),
        force,
    };

    let first = executor.request(request(true), Duration::from_secs(30), Duration::from_secs(10));
    let second = executor.request(request(true), Duration::from_secs(30), Duration::from_secs(10));

    assert_eq!(first, RestartOutcome::Accepted);
    assert_eq!(second, RestartOutcome::Skipped("in_progress".to_string()));
}

/// Scenario: reloading config with a changed container list replaces the
/// managed set while preserving state for retained targets.
#[tokio::test]
async fn config_reload_with_container_list_change_updates_registry() {
    let registry = Arc::new(Registry::new(["web".to_string(), "db".to_string()]));
    registry.lookup("web").unwrap().with_fields(|f| f.failures = 3);

    // Simulates what CommandSurface::reload_config does internally once a
    // new effective config has been classified: replace the managed set.
    registry.replace(vec!["web".to_string(), "cache".to_string()]);

    assert!(!registry.contains("db"));
    assert!(registry.contains("cache"));
    assert_eq!(registry.lookup("web").unwrap().snapshot().failures, 3);
}
