//! KL-015: Append-only JSONL build event log.

use crate::core::types::{BuildEvent, TimestampedEvent};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Current UTC time as RFC 3339 with second precision.
pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Generate a run ID.
pub fn generate_run_id() -> String {
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default() as u64;
    format!("r-{:012x}", nanos & 0xFFFF_FFFF_FFFF)
}

/// Derive the event log path within the state directory.
pub fn event_log_path(state_dir: &Path) -> PathBuf {
    state_dir.join("events.jsonl")
}

/// Append an event to the build log.
pub fn append_event(state_dir: &Path, event: BuildEvent) -> Result<(), String> {
    let path = event_log_path(state_dir);
    std::fs::create_dir_all(state_dir).map_err(|e| format!("cannot create state dir: {}", e))?;

    let te = TimestampedEvent {
        ts: now_iso8601(),
        event,
    };
    let json = serde_json::to_string(&te).map_err(|e| format!("JSON serialize error: {}", e))?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("cannot open event log {}: {}", path.display(), e))?;

    writeln!(file, "{}", json).map_err(|e| format!("write error: {}", e))?;

    Ok(())
}

/// Read every event back, skipping lines that fail to parse.
pub fn read_events(state_dir: &Path) -> Result<Vec<TimestampedEvent>, String> {
    let path = event_log_path(state_dir);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    Ok(content
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}
