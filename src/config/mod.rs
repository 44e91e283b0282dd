//! Configuration loading and hot reload (spec §4.8, §6).
//!
//! Environment variables form the baseline; an optional JSON file
//! overlays only the fields it explicitly sets. Field minima are
//! enforced on the resulting [`EffectiveConfig`].

pub mod file;

use crate::error::WatchdogError;
pub use file::{FileConfig, FileConfigError};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// The fully-resolved configuration the rest of the watchdog operates on
/// (spec §3 "Config (effective)").
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub enabled: bool,
    pub containers: Vec<String>,
    pub poll_interval: Duration,
    pub max_failures: u32,
    pub retry_checks: u32,
    pub retry_interval: Duration,
    pub grace: Duration,
    pub cooldown: Duration,
    pub restart_timeout: Duration,
    pub docker_socket: String,
    pub use_events: bool,
    pub event_min_interval: Duration,
    pub status_report_interval: Duration,
    pub verbose: bool,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            containers: Vec::new(),
            poll_interval: Duration::from_secs(15),
            max_failures: 3,
            retry_checks: 2,
            retry_interval: Duration::from_secs(5),
            grace: Duration::from_secs(30),
            cooldown: Duration::from_secs(60),
            restart_timeout: Duration::from_secs(30),
            docker_socket: "/var/run/docker.sock".to_string(),
            use_events: true,
            event_min_interval: Duration::from_secs(5),
            status_report_interval: Duration::from_secs(300),
            verbose: false,
        }
    }
}

/// Which field groups changed between an old and new [`EffectiveConfig`]
/// (spec §4.8 "Hot apply").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReloadDiff {
    pub applied_fields: Vec<String>,
    pub requires_restart_fields: Vec<String>,
}

impl ReloadDiff {
    pub fn has_changes(&self) -> bool {
        !self.applied_fields.is_empty() || !self.requires_restart_fields.is_empty()
    }
}

/// Fields that can never be hot-applied: rebinding the runtime socket or
/// changing the startup grace period mid-flight would be silent and
/// surprising (spec §4.8).
const RESTART_REQUIRED_FIELDS: &[&str] = &["docker_socket", "grace"];

/// Classifies the diff between `old` and `new` and returns it alongside
/// the config that should actually take effect: hot-applicable fields
/// come from `new`, restart-required fields stay at `old`'s value.
pub fn classify_and_apply(old: &EffectiveConfig, new: &EffectiveConfig) -> (EffectiveConfig, ReloadDiff) {
    let mut diff = ReloadDiff::default();
    let mut effective = old.clone();

    macro_rules! hot_field {
        ($field:ident) => {
            if old.$field != new.$field {
                effective.$field = new.$field.clone();
                diff.applied_fields.push(stringify!($field).to_string());
            }
        };
    }

    if old.docker_socket != new.docker_socket {
        diff.requires_restart_fields.push("docker_socket".to_string());
    }
    if old.grace != new.grace {
        diff.requires_restart_fields.push("grace".to_string());
    }
    // events disabled -> enabled requires a restart (spawning the
    // subscriber task fresh); the reverse hot-applies.
    if !old.use_events && new.use_events {
        diff.requires_restart_fields.push("use_events".to_string());
    } else if old.use_events != new.use_events {
        effective.use_events = new.use_events;
        diff.applied_fields.push("use_events".to_string());
    }

    hot_field!(enabled);
    hot_field!(poll_interval);
    hot_field!(max_failures);
    hot_field!(retry_checks);
    hot_field!(retry_interval);
    hot_field!(cooldown);
    hot_field!(restart_timeout);
    hot_field!(event_min_interval);
    hot_field!(status_report_interval);
    hot_field!(verbose);

    if old.containers != new.containers {
        effective.containers = new.containers.clone();
        diff.applied_fields.push("containers".to_string());
    }

    (effective, diff)
}

/// Reads the environment-variable baseline.
pub fn from_env() -> EffectiveConfig {
    let defaults = EffectiveConfig::default();
    EffectiveConfig {
        enabled: env_bool("WATCHDOG_ENABLED").unwrap_or(defaults.enabled),
        containers: env::var("WATCHDOG_CONTAINERS")
            .ok()
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or(defaults.containers),
        poll_interval: env_secs("WATCHDOG_INTERVAL_SECONDS").unwrap_or(defaults.poll_interval),
        max_failures: env_u32("WATCHDOG_MAX_FAILURES").unwrap_or(defaults.max_failures),
        retry_checks: env_u32("WATCHDOG_RETRY_CHECKS").unwrap_or(defaults.retry_checks),
        retry_interval: env_secs("WATCHDOG_RETRY_INTERVAL_SECONDS")
            .unwrap_or(defaults.retry_interval),
        grace: env_secs("WATCHDOG_GRACE_SECONDS").unwrap_or(defaults.grace),
        cooldown: env_secs("WATCHDOG_COOLDOWN_SECONDS").unwrap_or(defaults.cooldown),
        restart_timeout: env_secs("WATCHDOG_RESTART_TIMEOUT_SEC")
            .unwrap_or(defaults.restart_timeout),
        docker_socket: env::var("WATCHDOG_DOCKER_SOCKET").unwrap_or(defaults.docker_socket),
        use_events: env_bool("WATCHDOG_USE_EVENTS").unwrap_or(defaults.use_events),
        event_min_interval: env_secs("WATCHDOG_EVENT_MIN_INTERVAL_SEC")
            .unwrap_or(defaults.event_min_interval),
        status_report_interval: env_secs("WATCHDOG_STATUS_REPORT_SECONDS")
            .unwrap_or(defaults.status_report_interval),
        verbose: env_bool("WATCHDOG_VERBOSE_LOGGING").unwrap_or(defaults.verbose),
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Overlays a [`FileConfig`]'s present fields onto a baseline.
pub fn overlay(base: EffectiveConfig, file: &FileConfig) -> EffectiveConfig {
    let mut cfg = base;
    if let Some(v) = file.enabled {
        cfg.enabled = v;
    }
    if let Some(v) = &file.containers {
        cfg.containers = v.clone();
    }
    if let Some(v) = file.interval_seconds {
        cfg.poll_interval = Duration::from_secs(v);
    }
    if let Some(v) = file.max_failures {
        cfg.max_failures = v;
    }
    if let Some(v) = file.retry_checks {
        cfg.retry_checks = v;
    }
    if let Some(v) = file.retry_interval_seconds {
        cfg.retry_interval = Duration::from_secs(v);
    }
    if let Some(v) = file.grace_seconds {
        cfg.grace = Duration::from_secs(v);
    }
    if let Some(v) = file.cooldown_seconds {
        cfg.cooldown = Duration::from_secs(v);
    }
    if let Some(v) = file.restart_timeout_sec {
        cfg.restart_timeout = Duration::from_secs(v);
    }
    if let Some(v) = &file.docker_socket {
        cfg.docker_socket = v.clone();
    }
    if let Some(v) = file.use_events {
        cfg.use_events = v;
    }
    if let Some(v) = file.event_min_interval_sec {
        cfg.event_min_interval = Duration::from_secs(v);
    }
    if let Some(v) = file.status_report_seconds {
        cfg.status_report_interval = Duration::from_secs(v);
    }
    if let Some(v) = file.verbose_logging {
        cfg.verbose = v;
    }
    cfg
}

/// Enforces spec §4.8's field minima, canonicalizing and deduping the
/// container list preserving order.
pub fn validate(mut cfg: EffectiveConfig) -> Result<EffectiveConfig, WatchdogError> {
    if cfg.poll_interval < Duration::from_secs(1) {
        return Err(WatchdogError::ConfigInvalid(
            "poll interval must be >= 1s".into(),
        ));
    }
    if cfg.retry_interval < Duration::from_secs(1) {
        return Err(WatchdogError::ConfigInvalid(
            "retry interval must be >= 1s".into(),
        ));
    }
    if cfg.restart_timeout < Duration::from_secs(5) {
        return Err(WatchdogError::ConfigInvalid(
            "restart timeout must be >= 5s".into(),
        ));
    }
    if cfg.max_failures < 1 {
        return Err(WatchdogError::ConfigInvalid(
            "max failures must be >= 1".into(),
        ));
    }
    if cfg.retry_checks < 1 {
        return Err(WatchdogError::ConfigInvalid(
            "retry checks must be >= 1".into(),
        ));
    }
    if cfg.docker_socket.trim().is_empty() {
        return Err(WatchdogError::ConfigInvalid(
            "docker socket must not be empty".into(),
        ));
    }

    let mut seen = std::collections::HashSet::new();
    let mut deduped = Vec::new();
    for name in cfg.containers {
        let name = crate::docker::canonicalize_name(&name);
        if name.is_empty() {
            continue;
        }
        if seen.insert(name.clone()) {
            deduped.push(name);
        }
    }
    cfg.containers = deduped;

    Ok(cfg)
}

/// The outcome of a `reload_config` command (spec §6 `ReloadResult`).
#[derive(Debug, Clone)]
pub struct ReloadResult {
    pub loaded_at: std::time::SystemTime,
    pub source: &'static str,
    pub path: Option<PathBuf>,
    pub diff: ReloadDiff,
    pub effective_summary: EffectiveConfig,
}

/// Resolves the effective configuration from env + an optional file path.
pub fn load(file_path: Option<&std::path::Path>) -> Result<(EffectiveConfig, &'static str), WatchdogError> {
    let base = from_env();
    match file_path {
        None => Ok((validate(base)?, "env")),
        Some(path) => {
            let file = FileConfig::read(path)
                .map_err(|e| WatchdogError::ConfigInvalid(e.to_string()))?;
            let overlaid = overlay(base, &file);
            Ok((validate(overlaid)?, "env+file"))
        }
    }
}
