//! Bounded administrative event audit trail (spec §3, §4.9).

use crate::registry::RestartBy;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::SystemTime;

pub const AUDIT_CAPACITY: usize = 200;

#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub at: SystemTime,
    pub action: String,
    /// Target name, or `"global"` for watchdog-wide actions.
    pub target: String,
    pub by: RestartBy,
    pub requested_by: String,
    pub reason: String,
    pub result: String,
    pub error: Option<String>,
}

/// A FIFO ring buffer of the last [`AUDIT_CAPACITY`] events. Its own
/// mutex is never held across a runtime call or a `tracing` emission
/// (spec §5).
pub struct AuditTrail {
    events: Mutex<VecDeque<AuditEvent>>,
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(AUDIT_CAPACITY)),
        }
    }
}

impl AuditTrail {
    pub fn record(&self, event: AuditEvent) {
        let level = match event.result.as_str() {
            "failed" => tracing::Level::ERROR,
            "skipped" => tracing::Level::WARN,
            _ => tracing::Level::INFO,
        };
        match level {
            tracing::Level::ERROR => tracing::error!(
                action = %event.action,
                target = %event.target,
                requested_by = %event.requested_by,
                reason = %event.reason,
                error = event.error.as_deref().unwrap_or(""),
                "audit"
            ),
            tracing::Level::WARN => tracing::warn!(
                action = %event.action,
                target = %event.target,
                requested_by = %event.requested_by,
                reason = %event.reason,
                "audit"
            ),
            _ => tracing::info!(
                action = %event.action,
                target = %event.target,
                requested_by = %event.requested_by,
                reason = %event.reason,
                "audit"
            ),
        };

        let mut events = self.events.lock().expect("audit lock poisoned");
        if events.len() == AUDIT_CAPACITY {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Returns the most recent `limit` events (capped at [`AUDIT_CAPACITY`]),
    /// newest last.
    pub fn snapshot(&self, limit: usize) -> Vec<AuditEvent> {
        let events = self.events.lock().expect("audit lock poisoned");
        let limit = limit.min(AUDIT_CAPACITY).min(events.len());
        events.iter().rev().take(limit).rev().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(action: &str) -> AuditEvent {
        AuditEvent {
            at: SystemTime::now(),
            action: action.to_string(),
            target: "a".to_string(),
            by: RestartBy::Auto,
            requested_by: "watchdog".to_string(),
            reason: "test".to_string(),
            result: "ok".to_string(),
            error: None,
        }
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let trail = AuditTrail::default();
        for i in 0..AUDIT_CAPACITY + 10 {
            trail.record(event(&format!("event-{i}")));
        }
        let snapshot = trail.snapshot(AUDIT_CAPACITY);
        assert_eq!(snapshot.len(), AUDIT_CAPACITY);
        assert_eq!(snapshot.first().unwrap().action, "event-10");
        assert_eq!(snapshot.last().unwrap().action, format!("event-{}", AUDIT_CAPACITY + 9));
    }

    #[test]
    fn snapshot_respects_limit() {
        let trail = AuditTrail::default();
        for i in 0..5 {
            trail.record(event(&format!("event-{i}")));
        }
        assert_eq!(trail.snapshot(2).len(), 2);
        assert_eq!(trail.snapshot(2).last().unwrap().action, "event-4");
    }
}
