//! The command surface (spec §4.7, §6): the one entry point through which
//! an operator (CLI, or any future control-plane front end) interacts with
//! a running watchdog. Every command returns a structured outcome rather
//! than propagating a bare error, so callers can render `ok` / `skipped`
//! / `failed` uniformly. Audit action strings are the stable log-event
//! names of spec §6.

use crate::audit::{AuditEvent, AuditTrail};
use crate::config::file::rewrite_containers;
use crate::config::{self, classify_and_apply, EffectiveConfig};
use crate::docker::{ContainerInspect, ContainerSummary, RuntimeClient};
use crate::error::WatchdogError;
use crate::executor::{RestartExecutor, RestartOutcome, RestartRequest};
use crate::poller::WakeSender;
use crate::registry::{Registry, RestartBy, TargetFields};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tracing::info;

/// A fresh, runtime-sourced view of a single container (spec §4.9),
/// composed from a batched `list` call and, for a single-target lookup,
/// a follow-up `inspect` call.
#[derive(Debug, Clone)]
pub struct RuntimeView {
    pub id: String,
    pub image: String,
    pub state: String,
    pub status: String,
    pub health: Option<String>,
    pub started_at: Option<SystemTime>,
    pub finished_at: Option<SystemTime>,
    pub exit_code: Option<i64>,
    pub restart_count: i64,
    pub uptime: Option<Duration>,
}

impl RuntimeView {
    /// The coarse view available from a batch listing alone: no
    /// started/finished timestamps, exit code or restart count, since
    /// those are only reported by `inspect`.
    fn from_summary(summary: ContainerSummary) -> Self {
        Self {
            id: summary.id,
            image: summary.image,
            state: summary.state,
            status: summary.status,
            health: summary.health,
            started_at: None,
            finished_at: None,
            exit_code: None,
            restart_count: 0,
            uptime: None,
        }
    }

    fn from_inspect(inspect: ContainerInspect, now: SystemTime) -> Self {
        let uptime = inspect.uptime(now);
        Self {
            id: inspect.id,
            image: inspect.image,
            state: inspect.state,
            status: inspect.status,
            health: inspect.health,
            started_at: inspect.started_at,
            finished_at: inspect.finished_at,
            exit_code: inspect.exit_code,
            restart_count: inspect.restart_count,
            uptime,
        }
    }

    /// Appends the `(inspect_failed)` suffix spec §4.9 requires when the
    /// fresh view falls back to the list-derived summary.
    fn mark_inspect_failed(mut self) -> Self {
        self.status = format!("{} (inspect_failed)", self.status);
        self
    }
}

/// The composed status of one managed target (spec §4.9): cached registry
/// fields plus, when available, a fresh runtime view.
#[derive(Debug, Clone)]
pub struct TargetStatusView {
    pub name: String,
    pub fields: TargetFields,
    pub restart_in_progress: bool,
    pub runtime: Option<RuntimeView>,
}

/// One container on the host plus whether it's in the managed registry
/// (spec §6 `list_runtime_containers`).
#[derive(Debug, Clone)]
pub struct HostContainer {
    pub summary: ContainerSummary,
    pub managed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Ok,
    Skipped(String),
    Failed(String),
}

pub struct CommandSurface {
    registry: Arc<Registry>,
    runtime: Arc<dyn RuntimeClient>,
    executor: Arc<RestartExecutor>,
    audit: Arc<AuditTrail>,
    config_tx: watch::Sender<EffectiveConfig>,
    config_path: Option<PathBuf>,
    wake: WakeSender,
}

impl CommandSurface {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<Registry>,
        runtime: Arc<dyn RuntimeClient>,
        executor: Arc<RestartExecutor>,
        audit: Arc<AuditTrail>,
        config_tx: watch::Sender<EffectiveConfig>,
        config_path: Option<PathBuf>,
        wake: WakeSender,
    ) -> Self {
        Self {
            registry,
            runtime,
            executor,
            audit,
            config_tx,
            config_path,
            wake,
        }
    }

    fn config(&self) -> EffectiveConfig {
        self.config_tx.borrow().clone()
    }

    fn audit(&self, action: &str, target: &str, requested_by: &str, reason: &str, result: &str, error: Option<String>) {
        self.audit.record(AuditEvent {
            at: SystemTime::now(),
            action: action.to_string(),
            target: target.to_string(),
            by: RestartBy::Manual,
            requested_by: requested_by.to_string(),
            reason: reason.to_string(),
            result: result.to_string(),
            error,
        });
    }

    /// Idempotent: calling twice is equivalent to calling once (spec §8).
    pub fn pause(&self, target: &str) -> CommandResult {
        let Some(state) = self.registry.lookup(target) else {
            return CommandResult::Skipped("not_managed".to_string());
        };
        state.with_fields(|f| {
            f.monitoring_paused = true;
            f.failures = 0;
        });
        info!(target, "monitor_pause");
        self.audit("monitor_pause", target, "operator", "", "ok", None);
        CommandResult::Ok
    }

    pub fn resume(&self, target: &str) -> CommandResult {
        let Some(state) = self.registry.lookup(target) else {
            return CommandResult::Skipped("not_managed".to_string());
        };
        state.with_fields(|f| f.monitoring_paused = false);
        info!(target, "monitor_resume");
        self.audit("monitor_resume", target, "operator", "", "ok", None);
        self.wake.wake();
        CommandResult::Ok
    }

    /// Pauses monitoring, then stops the container; on failure the
    /// previous pause state is restored so a failed stop doesn't silently
    /// leave monitoring suspended (spec §4.7).
    pub async fn stop(&self, target: &str, timeout: Duration, requested_by: &str, reason: &str) -> CommandResult {
        let Some(state) = self.registry.lookup(target) else {
            return CommandResult::Skipped("not_managed".to_string());
        };
        let was_paused = state.with_fields(|f| {
            let was = f.monitoring_paused;
            f.monitoring_paused = true;
            was
        });

        match self.runtime.stop(target, timeout).await {
            Ok(()) => {
                self.audit("stop", target, requested_by, reason, "ok", None);
                CommandResult::Ok
            }
            Err(e) => {
                state.with_fields(|f| f.monitoring_paused = was_paused);
                self.audit("stop", target, requested_by, reason, "failed", Some(e.to_string()));
                CommandResult::Failed(e.to_string())
            }
        }
    }

    /// Starts the container and resumes monitoring on success (spec §4.7).
    pub async fn start(&self, target: &str, requested_by: &str, reason: &str) -> CommandResult {
        let Some(state) = self.registry.lookup(target) else {
            return CommandResult::Skipped("not_managed".to_string());
        };
        let deadline = Duration::from_secs(15);
        match self.runtime.start(target, deadline).await {
            Ok(()) => {
                state.with_fields(|f| {
                    f.monitoring_paused = false;
                    f.failures = 0;
                });
                self.audit("start", target, requested_by, reason, "ok", None);
                self.wake.wake();
                CommandResult::Ok
            }
            Err(e) => {
                self.audit("start", target, requested_by, reason, "failed", Some(e.to_string()));
                CommandResult::Failed(e.to_string())
            }
        }
    }

    /// The general manual-restart verb (spec §6 `restart(name, requested_by,
    /// reason, force)`); `force_restart` below is the common `force=true`
    /// shorthand used by the "force-restart" table entry of spec §4.7.
    pub fn restart(&self, target: &str, requested_by: &str, reason: &str, force: bool) -> CommandResult {
        let config = self.config();
        match self.executor.request(
            RestartRequest {
                target: target.to_string(),
                by: RestartBy::Manual,
                reason: reason.to_string(),
                requested_by: requested_by.to_string(),
                force,
            },
            config.cooldown,
            config.restart_timeout,
        ) {
            RestartOutcome::Accepted => CommandResult::Ok,
            RestartOutcome::Skipped(reason) => CommandResult::Skipped(reason),
        }
    }

    /// Bypasses cooldown, still funnels through the CAS so a concurrent
    /// automatic or manual restart is rejected (spec §4.6, §8).
    pub fn force_restart(&self, target: &str, requested_by: &str) -> CommandResult {
        self.restart(target, requested_by, "operator force-restart", true)
    }

    /// Disables only *automatic* restarts; manual commands keep working
    /// while disabled (spec §4.7).
    pub fn set_enabled(&self, enabled: bool, requested_by: &str, reason: &str) -> CommandResult {
        let old = self.config();
        let mut new = old.clone();
        new.enabled = enabled;
        let (effective, _diff) = classify_and_apply(&old, &new);
        let _ = self.config_tx.send(effective);
        let action = if enabled { "watchdog_enable" } else { "watchdog_disable" };
        self.audit(action, "global", requested_by, reason, "ok", None);
        CommandResult::Ok
    }

    /// Adds or removes a target from the managed set, persisting the
    /// change to the config file via the atomic rewrite path so it
    /// survives a restart, and hot-reloads the registry (spec §4.1, §4.8,
    /// §9). Returns a `ReloadResult` per spec §6.
    pub fn set_managed(
        &self,
        target: &str,
        managed: bool,
        requested_by: &str,
        reason: &str,
    ) -> Result<config::ReloadResult, WatchdogError> {
        let canonical = crate::docker::canonicalize_name(target);
        let mut names = self.registry.names();
        if managed {
            if !names.contains(&canonical) {
                names.push(canonical.clone());
            }
        } else {
            names.retain(|n| n != &canonical);
        }

        if let Some(path) = &self.config_path {
            rewrite_containers(path, &names).map_err(|e| WatchdogError::ConfigInvalid(e.to_string()))?;
        }

        let old = self.config();
        let mut new = old.clone();
        new.containers = names;
        let (effective, diff) = classify_and_apply(&old, &new);
        let _ = self.config_tx.send(effective.clone());
        self.registry.replace(effective.containers.clone());
        self.wake.wake();

        let action = if managed { "target_managed_enable" } else { "target_managed_disable" };
        self.audit(action, &canonical, requested_by, reason, "ok", None);

        Ok(config::ReloadResult {
            loaded_at: SystemTime::now(),
            source: "command",
            path: self.config_path.clone(),
            diff,
            effective_summary: effective,
        })
    }

    /// Re-reads the config file (and environment), classifies the diff and
    /// applies every hot-applicable field immediately; fields requiring a
    /// restart are reported back but not applied (spec §4.8). Triggers an
    /// immediate sweep if anything was applied.
    pub fn reload_config(&self) -> Result<config::ReloadResult, WatchdogError> {
        let old = self.config();
        let (new, source) = config::load(self.config_path.as_deref())?;
        let (effective, diff) = classify_and_apply(&old, &new);
        let _ = self.config_tx.send(effective.clone());

        if diff.applied_fields.contains(&"containers".to_string()) {
            self.registry.replace(effective.containers.clone());
        }
        if diff.has_changes() {
            self.wake.wake();
        }

        self.audit(
            "watchdog_config_loaded",
            "global",
            "operator",
            &format!("applied={:?} restart_required={:?}", diff.applied_fields, diff.requires_restart_fields),
            "ok",
            None,
        );

        Ok(config::ReloadResult {
            loaded_at: SystemTime::now(),
            source,
            path: self.config_path.clone(),
            diff,
            effective_summary: effective,
        })
    }

    /// Composes every managed target's cached state with a fresh,
    /// batched `list` call (spec §4.9); unlike [`Self::get_target_status`]
    /// this does not `inspect` each target individually, so the runtime
    /// view it attaches omits `inspect`-only fields (started/finished,
    /// exit code, restart count, uptime).
    pub async fn list_targets_status(&self) -> Vec<TargetStatusView> {
        let snapshots = self.registry.snapshot_all();
        let names: Vec<String> = snapshots.iter().map(|s| s.name.clone()).collect();

        let by_name: HashMap<String, ContainerSummary> =
            match self.runtime.list(&names, Duration::from_secs(10)).await {
                Ok(containers) => containers.into_iter().map(|c| (c.name.clone(), c)).collect(),
                Err(_) => HashMap::new(),
            };

        snapshots
            .into_iter()
            .map(|snapshot| {
                let runtime = by_name.get(&snapshot.name).cloned().map(RuntimeView::from_summary);
                TargetStatusView {
                    name: snapshot.name,
                    fields: snapshot.fields,
                    restart_in_progress: snapshot.restart_in_progress,
                    runtime,
                }
            })
            .collect()
    }

    /// A single target's status, enriched with a fresh runtime view
    /// composed from a bounded listing plus a single `inspect` call; on
    /// `inspect` failure the list-derived view is returned instead, with
    /// `(inspect_failed)` appended to its status label (spec §4.9).
    pub async fn get_target_status(&self, target: &str) -> Option<TargetStatusView> {
        let canonical = crate::docker::canonicalize_name(target);
        let state = self.registry.lookup(&canonical)?;
        let fields = state.snapshot();
        let restart_in_progress = state
            .restart_in_progress
            .load(std::sync::atomic::Ordering::SeqCst);

        let runtime = self.fresh_runtime_view(&canonical).await;

        Some(TargetStatusView {
            name: canonical,
            fields,
            restart_in_progress,
            runtime,
        })
    }

    async fn fresh_runtime_view(&self, name: &str) -> Option<RuntimeView> {
        let listing = self
            .runtime
            .list(&[name.to_string()], Duration::from_secs(10))
            .await
            .ok()?;
        let summary = listing.into_iter().find(|c| c.name == name)?;

        match self.runtime.inspect(name, Duration::from_secs(10)).await {
            Ok(inspect) => Some(RuntimeView::from_inspect(inspect, SystemTime::now())),
            Err(_) => Some(RuntimeView::from_summary(summary).mark_inspect_failed()),
        }
    }

    pub async fn list_runtime_containers(&self) -> Result<Vec<HostContainer>, WatchdogError> {
        let containers = self.runtime.list_all(Duration::from_secs(15)).await?;
        Ok(containers
            .into_iter()
            .map(|summary| {
                let managed = self.registry.contains(&summary.name);
                HostContainer { summary, managed }
            })
            .collect())
    }

    pub fn snapshot_events(&self, limit: usize) -> Vec<AuditEvent> {
        self.audit.snapshot(limit)
    }
}
