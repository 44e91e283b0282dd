//! The on-disk JSON config file (spec §6) and its atomic rewrite path
//! (spec §4.8, §9), used by `set_managed`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileConfigError {
    #[error("reading config file `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config file `{path}`: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("writing config file `{path}`: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// All fields are optional: only those explicitly present override the
/// environment baseline (spec §6).
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub containers: Option<Vec<String>>,
    #[serde(rename = "intervalSeconds", skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<u64>,
    #[serde(rename = "maxFailures", skip_serializing_if = "Option::is_none")]
    pub max_failures: Option<u32>,
    #[serde(rename = "retryChecks", skip_serializing_if = "Option::is_none")]
    pub retry_checks: Option<u32>,
    #[serde(
        rename = "retryIntervalSeconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub retry_interval_seconds: Option<u64>,
    #[serde(rename = "graceSeconds", skip_serializing_if = "Option::is_none")]
    pub grace_seconds: Option<u64>,
    #[serde(rename = "cooldownSeconds", skip_serializing_if = "Option::is_none")]
    pub cooldown_seconds: Option<u64>,
    #[serde(rename = "restartTimeoutSec", skip_serializing_if = "Option::is_none")]
    pub restart_timeout_sec: Option<u64>,
    #[serde(rename = "dockerSocket", skip_serializing_if = "Option::is_none")]
    pub docker_socket: Option<String>,
    #[serde(rename = "useEvents", skip_serializing_if = "Option::is_none")]
    pub use_events: Option<bool>,
    #[serde(
        rename = "eventMinIntervalSec",
        skip_serializing_if = "Option::is_none"
    )]
    pub event_min_interval_sec: Option<u64>,
    #[serde(rename = "statusReportSeconds", skip_serializing_if = "Option::is_none")]
    pub status_report_seconds: Option<u64>,
    #[serde(rename = "verboseLogging", skip_serializing_if = "Option::is_none")]
    pub verbose_logging: Option<bool>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, FileConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| FileConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| FileConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Serializes a `containers` list change into the file's JSON object,
/// preserving all other keys, then performs an atomic rewrite: write to
/// a temp file in the same directory, `fsync`, `rename`, best-effort
/// `fsync` the directory. Keys are written in lexicographic order so
/// external diff tools see only the intended change (spec §9).
static REWRITE_LOCK: Mutex<()> = Mutex::new(());

pub fn rewrite_containers(path: &Path, containers: &[String]) -> Result<(), FileConfigError> {
    let _guard = REWRITE_LOCK.lock().expect("rewrite lock poisoned");

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => "{}".to_string(),
        Err(source) => {
            return Err(FileConfigError::Read {
                path: path.display().to_string(),
                source,
            })
        }
    };

    let mut root: Map<String, Value> =
        serde_json::from_str(&raw).map_err(|source| FileConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

    root.insert(
        "containers".to_string(),
        Value::Array(containers.iter().map(|c| Value::String(c.clone())).collect()),
    );

    let mut sorted = Map::new();
    let mut keys: Vec<_> = root.keys().cloned().collect();
    keys.sort();
    for key in keys {
        sorted.insert(key.clone(), root.remove(&key).unwrap());
    }

    let mut serialized = serde_json::to_string_pretty(&Value::Object(sorted))
        .map_err(|source| FileConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
    serialized.push('\n');

    atomic_write(path, serialized.as_bytes())
}

fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), FileConfigError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp_path = dir.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("config")
    ));

    {
        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|source| FileConfigError::Write {
                path: tmp_path.display().to_string(),
                source,
            })?;
        tmp_file
            .write_all(contents)
            .map_err(|source| FileConfigError::Write {
                path: tmp_path.display().to_string(),
                source,
            })?;
        tmp_file.sync_all().map_err(|source| FileConfigError::Write {
            path: tmp_path.display().to_string(),
            source,
        })?;
    }

    fs::rename(&tmp_path, path).map_err(|source| FileConfigError::Write {
        path: path.display().to_string(),
        source,
    })?;

    // Best-effort directory fsync so the rename survives a crash.
    if let Ok(dir_handle) = File::open(dir) {
        let _ = dir_handle.sync_all();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rewrite_preserves_unrelated_keys_and_sorts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"verboseLogging": true, "maxFailures": 5, "containers": ["old"]}"#,
        )
        .unwrap();

        rewrite_containers(&path, &["a".to_string(), "b".to_string()]).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.ends_with('\n'));
        let parsed: Map<String, Value> = serde_json::from_str(&raw).unwrap();
        let keys: Vec<_> = parsed.keys().cloned().collect();
        let mut sorted_keys = keys.clone();
        sorted_keys.sort();
        assert_eq!(keys, sorted_keys);
        assert_eq!(parsed["maxFailures"], Value::from(5));
        assert_eq!(parsed["verboseLogging"], Value::from(true));
        assert_eq!(
            parsed["containers"],
            Value::Array(vec![Value::String("a".into()), Value::String("b".into())])
        );
    }

    #[test]
    fn rewrite_creates_file_if_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        rewrite_containers(&path, &["x".to_string()]).unwrap();
        let file = FileConfig::read(&path).unwrap();
        assert_eq!(file.containers, Some(vec!["x".to_string()]));
    }

    #[test]
    fn deserializes_full_schema() {
        let raw = r#"{
            "enabled": true,
            "containers": ["a", "b"],
            "intervalSeconds": 10,
            "maxFailures": 3,
            "retryChecks": 2,
            "retryIntervalSeconds": 5,
            "graceSeconds": 30,
            "cooldownSeconds": 60,
            "restartTimeoutSec": 30,
            "dockerSocket": "/var/run/docker.sock",
            "useEvents": true,
            "eventMinIntervalSec": 5,
            "statusReportSeconds": 300,
            "verboseLogging": false
        }"#;
        let file: FileConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(file.containers, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(file.max_failures, Some(3));
    }
}
