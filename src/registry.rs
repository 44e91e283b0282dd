//! The target registry (spec §4.1): the canonical set of managed
//! container names and their per-target runtime state.
//!
//! Mutation discipline matches spec §5's shared-resource policy: the
//! outer map is behind a `RwLock` (writers are only config reload and
//! `set_managed`, both already serialized upstream by the config-file
//! mutex); each target's mutable fields live behind their own `Mutex`
//! so that a long-running restart never blocks unrelated targets, and
//! `restart_in_progress` is a standalone atomic so the CAS can be tested
//! without acquiring the per-target lock first (spec §5 ordering rule).

use crate::docker::canonicalize_name;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartBy {
    Auto,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartResult {
    Initiated,
    Ok,
    Failed,
    Skipped,
}

/// Provenance of the most recent restart attempt (spec §3).
#[derive(Debug, Clone)]
pub struct RestartProvenance {
    pub at: SystemTime,
    pub by: RestartBy,
    pub requested_by: String,
    pub reason: String,
    pub result: RestartResult,
    pub error: Option<String>,
}

/// The mutable fields of a target, guarded by a single lock so updates are
/// atomic with respect to each other (spec §3 invariants).
#[derive(Debug, Clone, Default)]
pub struct TargetFields {
    pub failures: u32,
    pub last_status: String,
    pub last_checked_at: Option<SystemTime>,
    pub cooldown_until: Option<SystemTime>,
    pub monitoring_paused: bool,
    pub last_restart: Option<RestartProvenance>,
}

/// A single managed target's full runtime state. `restart_in_progress` is
/// intentionally outside `fields`'s lock: the CAS must be attemptable
/// without blocking on whatever else holds the field lock (spec §5).
pub struct TargetState {
    pub restart_in_progress: AtomicBool,
    fields: Mutex<TargetFields>,
}

impl Default for TargetState {
    fn default() -> Self {
        Self {
            restart_in_progress: AtomicBool::new(false),
            fields: Mutex::new(TargetFields::default()),
        }
    }
}

impl TargetState {
    /// Attempts to claim the restart lane. Returns `true` if this caller
    /// won the CAS (was the one to flip `false -> true`).
    pub fn try_begin_restart(&self) -> bool {
        self.restart_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_restart(&self) {
        self.restart_in_progress.store(false, Ordering::SeqCst);
    }

    pub fn with_fields<R>(&self, f: impl FnOnce(&mut TargetFields) -> R) -> R {
        let mut guard = self.fields.lock().expect("target state lock poisoned");
        f(&mut guard)
    }

    pub fn snapshot(&self) -> TargetFields {
        self.fields.lock().expect("target state lock poisoned").clone()
    }
}

/// The registry's public view of a single target: its name plus a
/// snapshot of its fields, safe to hand to callers outside any lock.
#[derive(Debug, Clone)]
pub struct TargetSnapshot {
    pub name: String,
    pub fields: TargetFields,
    pub restart_in_progress: bool,
}

pub struct Registry {
    targets: RwLock<HashMap<String, Arc<TargetState>>>,
}

impl Registry {
    pub fn new(names: impl IntoIterator<Item = String>) -> Self {
        let mut targets = HashMap::new();
        for name in dedup_preserving_order(names) {
            targets.insert(name, Arc::new(TargetState::default()));
        }
        Self {
            targets: RwLock::new(targets),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<TargetState>> {
        let name = canonicalize_name(name);
        self.targets
            .read()
            .expect("registry lock poisoned")
            .get(&name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.targets
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        let name = canonicalize_name(name);
        self.targets
            .read()
            .expect("registry lock poisoned")
            .contains_key(&name)
    }

    pub fn snapshot_all(&self) -> Vec<TargetSnapshot> {
        self.targets
            .read()
            .expect("registry lock poisoned")
            .iter()
            .map(|(name, state)| TargetSnapshot {
                name: name.clone(),
                fields: state.snapshot(),
                restart_in_progress: state.restart_in_progress.load(Ordering::SeqCst),
            })
            .collect()
    }

    /// Atomically replaces the managed set (spec §4.1): retained names
    /// keep their existing `TargetState` (same `Arc`, same in-flight CAS
    /// and counters), new names get a fresh zeroed state, and removed
    /// names are dropped.
    pub fn replace(&self, new_names: impl IntoIterator<Item = String>) {
        let new_names = dedup_preserving_order(new_names);
        let mut targets = self.targets.write().expect("registry lock poisoned");
        let mut replacement = HashMap::with_capacity(new_names.len());
        for name in new_names {
            let state = targets
                .remove(&name)
                .unwrap_or_else(|| Arc::new(TargetState::default()));
            replacement.insert(name, state);
        }
        *targets = replacement;
    }

    /// Adds a single name to the registry if absent, preserving any
    /// existing state for it (idempotent, used by `set_managed`).
    pub fn add(&self, name: &str) {
        let name = canonicalize_name(name);
        let mut targets = self.targets.write().expect("registry lock poisoned");
        targets.entry(name).or_insert_with(|| Arc::new(TargetState::default()));
    }

    pub fn remove(&self, name: &str) {
        let name = canonicalize_name(name);
        self.targets
            .write()
            .expect("registry lock poisoned")
            .remove(&name);
    }
}

fn dedup_preserving_order(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for name in names {
        let name = canonicalize_name(&name);
        if name.is_empty() {
            continue;
        }
        if seen.insert(name.clone()) {
            out.push(name);
        }
    }
    out
}
