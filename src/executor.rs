//! The restart executor (spec §4.6): the single funnel for every restart,
//! automatic or manual.
//!
//! The executor is the only place that writes `cooldown_until` and the
//! only place that clears `restart_in_progress`, which is how the CAS
//! discipline (spec §5, §8) is upheld crate-wide.

use crate::audit::{AuditEvent, AuditTrail};
use crate::config::EffectiveConfig;
use crate::docker::RuntimeClient;
use crate::registry::{RestartBy, RestartProvenance, RestartResult, Registry};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartRequest {
    pub target: String,
    pub by: RestartBy,
    pub reason: String,
    pub requested_by: String,
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    Accepted,
    Skipped(String),
}

pub struct RestartExecutor {
    registry: Arc<Registry>,
    runtime: Arc<dyn RuntimeClient>,
    audit: Arc<AuditTrail>,
}

impl RestartExecutor {
    pub fn new(registry: Arc<Registry>, runtime: Arc<dyn RuntimeClient>, audit: Arc<AuditTrail>) -> Self {
        Self {
            registry,
            runtime,
            audit,
        }
    }

    /// Runs the ordered preconditions of spec §4.6 and, if accepted,
    /// spawns the actual restart on a detached task bounded by
    /// `restart_timeout + 10s`, re-parented to the watchdog's root
    /// lifetime rather than any caller-supplied context so a disconnected
    /// manual caller cannot strand the runtime (spec §4.6, §5, §9).
    pub fn request(&self, request: RestartRequest, cooldown: Duration, restart_timeout: Duration) -> RestartOutcome {
        let Some(state) = self.registry.lookup(&request.target) else {
            return RestartOutcome::Skipped("not_managed".to_string());
        };

        let now = SystemTime::now();

        if request.by == RestartBy::Auto {
            let paused = state.with_fields(|f| f.monitoring_paused);
            if paused {
                self.audit.record(self.skip_event(&request, now, "paused"));
                return RestartOutcome::Skipped("paused".to_string());
            }
        }

        if !request.force {
            let cooldown_until = state.with_fields(|f| f.cooldown_until);
            if let Some(until) = cooldown_until {
                if now < until {
                    let remaining = crate::utils::time::remaining(until, now);
                    let reason = format!("cooldown({}s)", remaining.as_secs());
                    self.audit.record(self.skip_event(&request, now, &reason));
                    return RestartOutcome::Skipped(reason);
                }
            }
        }

        if !state.try_begin_restart() {
            self.audit.record(self.skip_event(&request, now, "in_progress"));
            return RestartOutcome::Skipped("in_progress".to_string());
        }

        state.with_fields(|f| {
            f.last_restart = Some(RestartProvenance {
                at: now,
                by: request.by.clone(),
                requested_by: request.requested_by.clone(),
                reason: request.reason.clone(),
                result: RestartResult::Initiated,
                error: None,
            });
        });
        self.audit.record(AuditEvent {
            at: now,
            action: "restart_initiated".to_string(),
            target: request.target.clone(),
            by: request.by.clone(),
            requested_by: request.requested_by.clone(),
            reason: request.reason.clone(),
            result: "ok".to_string(),
            error: None,
        });
        info!(target = %request.target, by = ?request.by, "restart_initiated");

        let registry = self.registry.clone();
        let runtime = self.runtime.clone();
        let audit = self.audit.clone();
        let request_clone = request.clone();
        let deadline = restart_timeout + Duration::from_secs(10);

        tokio::spawn(async move {
            let Some(state) = registry.lookup(&request_clone.target) else {
                return;
            };
            let result = tokio::time::timeout(
                deadline,
                runtime.restart(&request_clone.target, restart_timeout),
            )
            .await;

            let completed_at = SystemTime::now();
            match result {
                Ok(Ok(())) => {
                    state.with_fields(|f| {
                        f.failures = 0;
                        f.cooldown_until = Some(completed_at + cooldown);
                        if let Some(p) = &mut f.last_restart {
                            p.result = RestartResult::Ok;
                        }
                    });
                    audit.record(AuditEvent {
                        at: completed_at,
                        action: "restart_ok".to_string(),
                        target: request_clone.target.clone(),
                        by: request_clone.by.clone(),
                        requested_by: request_clone.requested_by.clone(),
                        reason: request_clone.reason.clone(),
                        result: "ok".to_string(),
                        error: None,
                    });
                    info!(target = %request_clone.target, "restart_ok");
                }
                Ok(Err(e)) => {
                    let msg = e.to_string();
                    state.with_fields(|f| {
                        if let Some(p) = &mut f.last_restart {
                            p.result = RestartResult::Failed;
                            p.error = Some(msg.clone());
                        }
                    });
                    audit.record(AuditEvent {
                        at: completed_at,
                        action: "restart_failed".to_string(),
                        target: request_clone.target.clone(),
                        by: request_clone.by.clone(),
                        requested_by: request_clone.requested_by.clone(),
                        reason: request_clone.reason.clone(),
                        result: "failed".to_string(),
                        error: Some(msg.clone()),
                    });
                    error!(target = %request_clone.target, error = %msg, "restart_failed");
                }
                Err(_) => {
                    let msg = "restart timed out".to_string();
                    state.with_fields(|f| {
                        if let Some(p) = &mut f.last_restart {
                            p.result = RestartResult::Failed;
                            p.error = Some(msg.clone());
                        }
                    });
                    audit.record(AuditEvent {
                        at: completed_at,
                        action: "restart_failed".to_string(),
                        target: request_clone.target.clone(),
                        by: request_clone.by.clone(),
                        requested_by: request_clone.requested_by.clone(),
                        reason: request_clone.reason.clone(),
                        result: "failed".to_string(),
                        error: Some(msg.clone()),
                    });
                    warn!(target = %request_clone.target, "restart_failed: timed out");
                }
            }
            state.end_restart();
        });

        RestartOutcome::Accepted
    }

    fn skip_event(&self, request: &RestartRequest, at: SystemTime, reason: &str) -> AuditEvent {
        AuditEvent {
            at,
            action: "restart_skipped".to_string(),
            target: request.target.clone(),
            by: request.by.clone(),
            requested_by: request.requested_by.clone(),
            reason: reason.to_string(),
            result: "skipped".to_string(),
            error: None,
        }
    }
}

/// Convenience accessor used by the state machine when escalating from the
/// retry verifier: builds the config-derived timeouts into one call.
pub fn request_auto_restart(
    executor: &RestartExecutor,
    target: &str,
    reason: String,
    config: &EffectiveConfig,
) -> RestartOutcome {
    executor.request(
        RestartRequest {
            target: target.to_string(),
            by: RestartBy::Auto,
            reason,
            requested_by: "watchdog".to_string(),
            force: false,
        },
        config.cooldown,
        config.restart_timeout,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::client::tests::MockRuntimeClient;
    use crate::registry::Registry;

    fn setup() -> (Arc<Registry>, Arc<AuditTrail>) {
        let registry = Arc::new(Registry::new(["a".to_string()]));
        let audit = Arc::new(AuditTrail::default());
        (registry, audit)
    }

    #[tokio::test]
    async fn rejects_unknown_target() {
        let (registry, audit) = setup();
        let runtime = Arc::new(MockRuntimeClient::new());
        let executor = RestartExecutor::new(registry, runtime, audit);
        let outcome = executor.request(
            RestartRequest {
                target: "ghost".into(),
                by: RestartBy::Manual,
                reason: "test".into(),
                requested_by: "op".into(),
                force: true,
            },
            Duration::from_secs(30),
            Duration::from_secs(10),
        );
        assert_eq!(outcome, RestartOutcome::Skipped("not_managed".to_string()));
    }

    #[tokio::test]
    async fn second_concurrent_restart_is_rejected() {
        let (registry, audit) = setup();
        let mut mock = MockRuntimeClient::new();
        mock.expect_restart()
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));
        let runtime = Arc::new(mock);
        let executor = RestartExecutor::new(registry.clone(), runtime, audit);

        let req = |force| RestartRequest {
            target: "a".into(),
            by: RestartBy::Manual,
            reason: "test".into(),
            requested_by: "op".into(),
            force,
        };

        let first = executor.request(req(true), Duration::from_secs(30), Duration::from_secs(10));
        let second = executor.request(req(true), Duration::from_secs(30), Duration::from_secs(10));

        assert_eq!(first, RestartOutcome::Accepted);
        assert_eq!(second, RestartOutcome::Skipped("in_progress".to_string()));
    }

    #[tokio::test]
    async fn cooldown_blocks_unless_forced() {
        let (registry, audit) = setup();
        let state = registry.lookup("a").unwrap();
        state.with_fields(|f| f.cooldown_until = Some(SystemTime::now() + Duration::from_secs(60)));
        let runtime = Arc::new(MockRuntimeClient::new());
        let executor = RestartExecutor::new(registry, runtime, audit);

        let outcome = executor.request(
            RestartRequest {
                target: "a".into(),
                by: RestartBy::Manual,
                reason: "test".into(),
                requested_by: "op".into(),
                force: false,
            },
            Duration::from_secs(30),
            Duration::from_secs(10),
        );
        assert!(matches!(outcome, RestartOutcome::Skipped(reason) if reason.starts_with("cooldown")));
    }

    #[tokio::test]
    async fn paused_blocks_automatic_but_not_manual() {
        let (registry, audit) = setup();
        let state = registry.lookup("a").unwrap();
        state.with_fields(|f| f.monitoring_paused = true);
        let runtime = Arc::new(MockRuntimeClient::new());
        let executor = RestartExecutor::new(registry, runtime, audit);

        let auto_outcome = executor.request(
            RestartRequest {
                target: "a".into(),
                by: RestartBy::Auto,
                reason: "test".into(),
                requested_by: "watchdog".into(),
                force: false,
            },
            Duration::from_secs(30),
            Duration::from_secs(10),
        );
        assert_eq!(auto_outcome, RestartOutcome::Skipped("paused".to_string()));
    }
}
