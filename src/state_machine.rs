//! Per-target state transitions and the retry verifier (spec §4.5).
//!
//! `process_observation` is invoked once per target per poller sweep. It
//! holds no lock across the retry verifier's sleeps: each update
//! re-acquires the per-target lock, matching spec §5's "suspension
//! points" guidance.

use crate::audit::{AuditEvent, AuditTrail};
use crate::config::EffectiveConfig;
use crate::docker::{ContainerSummary, RuntimeClient};
use crate::executor::{request_auto_restart, RestartExecutor};
use crate::health::evaluate;
use crate::registry::{RestartBy, TargetState};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use tokio_util::sync::CancellationToken;

/// Processes a single target's latest observation. `summary` is `None`
/// when the poller's listing did not return this target at all.
pub async fn process_observation(
    name: &str,
    state: &Arc<TargetState>,
    summary: Option<&ContainerSummary>,
    config: &EffectiveConfig,
    runtime: &Arc<dyn RuntimeClient>,
    executor: &RestartExecutor,
    audit: &Arc<AuditTrail>,
    cancellation: &CancellationToken,
) {
    let now = SystemTime::now();

    let paused = state.with_fields(|f| f.monitoring_paused);
    if paused {
        let observation = evaluate(summary);
        state.with_fields(|f| {
            f.last_checked_at = Some(now);
            f.last_status = format!("paused_{}", observation.label);
            f.failures = 0;
        });
        return;
    }

    let observation = evaluate(summary);
    state.with_fields(|f| {
        f.last_checked_at = Some(now);
        f.last_status = observation.label.clone();
    });

    if observation.healthy {
        let recovered = state.with_fields(|f| {
            let was_failing = f.failures > 0;
            f.failures = 0;
            was_failing
        });
        if recovered {
            info!(target = %name, "recover");
            audit.record(AuditEvent {
                at: now,
                action: "recover".to_string(),
                target: name.to_string(),
                by: RestartBy::Auto,
                requested_by: "watchdog".to_string(),
                reason: observation.label.clone(),
                result: "ok".to_string(),
                error: None,
            });
        }
        audit.record(AuditEvent {
            at: now,
            action: "healthy".to_string(),
            target: name.to_string(),
            by: RestartBy::Auto,
            requested_by: "watchdog".to_string(),
            reason: observation.label,
            result: "ok".to_string(),
            error: None,
        });
        return;
    }

    let failures = state.with_fields(|f| {
        f.failures += 1;
        f.failures
    });
    warn!(target = %name, failures, label = %observation.label, "unhealthy");
    audit.record(AuditEvent {
        at: now,
        action: "unhealthy".to_string(),
        target: name.to_string(),
        by: RestartBy::Auto,
        requested_by: "watchdog".to_string(),
        reason: observation.label.clone(),
        result: "ok".to_string(),
        error: None,
    });

    if failures < config.max_failures {
        return;
    }

    run_retry_verifier(
        name,
        state,
        observation.label,
        failures,
        config,
        runtime,
        executor,
        audit,
        cancellation,
    )
    .await;
}

/// The bounded re-probing loop of spec §4.5. Runs up to `retry_checks`
/// additional probes spaced by `retry_interval`; any healthy observation
/// aborts escalation, otherwise the target is handed to the executor.
#[allow(clippy::too_many_arguments)]
async fn run_retry_verifier(
    name: &str,
    state: &Arc<TargetState>,
    initial_label: String,
    failures_at_threshold: u32,
    config: &EffectiveConfig,
    runtime: &Arc<dyn RuntimeClient>,
    executor: &RestartExecutor,
    audit: &Arc<AuditTrail>,
    cancellation: &CancellationToken,
) {
    let now = SystemTime::now();
    info!(target = %name, "retry_verification_start");
    audit.record(AuditEvent {
        at: now,
        action: "retry_verification_start".to_string(),
        target: name.to_string(),
        by: RestartBy::Auto,
        requested_by: "watchdog".to_string(),
        reason: format!("healthcheck failures={failures_at_threshold}"),
        result: "ok".to_string(),
        error: None,
    });

    for attempt in 1..=config.retry_checks {
        tokio::select! {
            _ = cancellation.cancelled() => return,
            _ = tokio::time::sleep(config.retry_interval) => {}
        }

        let listing = runtime.list(&[name.to_string()], Duration::from_secs(10)).await;
        let summary = match listing {
            Ok(containers) => containers.into_iter().find(|c| c.name == name),
            Err(e) => {
                // One listing error per attempt is tolerated (spec §7); it
                // counts as an attempt continuing without resolving health.
                debug!(target = %name, error = %e, attempt, "retry probe listing failed");
                continue;
            }
        };

        let observation = evaluate(summary.as_ref());
        if observation.healthy {
            state.with_fields(|f| {
                f.failures = 0;
                f.last_status = observation.label.clone();
            });
            info!(target = %name, attempt, "recover_during_retry");
            audit.record(AuditEvent {
                at: SystemTime::now(),
                action: "recover_during_retry".to_string(),
                target: name.to_string(),
                by: RestartBy::Auto,
                requested_by: "watchdog".to_string(),
                reason: observation.label,
                result: "ok".to_string(),
                error: None,
            });
            return;
        }

        warn!(target = %name, attempt, label = %observation.label, "retry_still_unhealthy");
        audit.record(AuditEvent {
            at: SystemTime::now(),
            action: "retry_still_unhealthy".to_string(),
            target: name.to_string(),
            by: RestartBy::Auto,
            requested_by: "watchdog".to_string(),
            reason: observation.label,
            result: "ok".to_string(),
            error: None,
        });
    }

    warn!(target = %name, "retry_verification_failed");
    audit.record(AuditEvent {
        at: SystemTime::now(),
        action: "retry_verification_failed".to_string(),
        target: name.to_string(),
        by: RestartBy::Auto,
        requested_by: "watchdog".to_string(),
        reason: initial_label.clone(),
        result: "ok".to_string(),
        error: None,
    });

    if !config.enabled {
        debug!(target = %name, "automatic restarts disabled, not escalating");
        audit.record(AuditEvent {
            at: SystemTime::now(),
            action: "restart_skipped".to_string(),
            target: name.to_string(),
            by: RestartBy::Auto,
            requested_by: "watchdog".to_string(),
            reason: "watchdog_disabled".to_string(),
            result: "skipped".to_string(),
            error: None,
        });
        return;
    }

    let reason = format!(
        "healthcheck failures={failures_at_threshold} status={initial_label} threshold={}",
        config.max_failures
    );
    request_auto_restart(executor, name, reason, config);
}
