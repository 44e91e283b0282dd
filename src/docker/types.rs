//! Data types exchanged with the container runtime client.
//!
//! These are a deliberately narrow projection of what `bollard` reports:
//! only the fields the health evaluator, status snapshot and audit trail
//! need ever cross the `RuntimeClient` boundary.

use std::time::SystemTime;

/// One container as returned by a batch listing call.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSummary {
    pub id: String,
    /// Canonicalized name (leading `/` stripped, trimmed).
    pub name: String,
    pub image: String,
    /// Docker's coarse state: `running`, `restarting`, `exited`, `paused`, `created`, ...
    pub state: String,
    /// Docker's human status string, e.g. `Up 3 minutes (healthy)`.
    pub status: String,
    /// `healthy` | `unhealthy` | `starting` | `none` (no healthcheck declared).
    pub health: Option<String>,
}

/// A richer per-container view used by the status snapshot (spec §4.9).
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInspect {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    pub status: String,
    pub health: Option<String>,
    pub started_at: Option<SystemTime>,
    pub finished_at: Option<SystemTime>,
    pub exit_code: Option<i64>,
    pub restart_count: i64,
}

impl ContainerInspect {
    pub fn uptime(&self, now: SystemTime) -> Option<std::time::Duration> {
        if self.state != "running" {
            return None;
        }
        self.started_at.and_then(|s| now.duration_since(s).ok())
    }
}

/// Canonicalizes a raw runtime-reported container name: strips a single
/// leading `/` and trims whitespace.
pub fn canonicalize_name(raw: &str) -> String {
    raw.trim().trim_start_matches('/').trim().to_string()
}

/// A relevant runtime event, already filtered down to the action kinds the
/// watchdog cares about (spec §4.4, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEventKind {
    Die,
    HealthStatus,
    Restart,
    Start,
    Stop,
}

impl RuntimeEventKind {
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "die" => Some(Self::Die),
            a if a.starts_with("health_status") => Some(Self::HealthStatus),
            "restart" => Some(Self::Restart),
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEvent {
    pub kind: RuntimeEventKind,
    pub container_name: String,
}
