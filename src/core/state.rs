//! KL-013: Build lock management: load, save (atomic), path derivation.

use super::types::{BuildLock, TargetRecord};
use std::path::{Path, PathBuf};

/// Derive the lock file path within the state directory.
pub fn lock_file_path(state_dir: &Path) -> PathBuf {
    state_dir.join("kiln.lock.yaml")
}

/// Load the build lock. Returns None if it doesn't exist yet.
pub fn load_lock(state_dir: &Path) -> Result<Option<BuildLock>, String> {
    let path = lock_file_path(state_dir);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let lock: BuildLock = serde_yaml_ng::from_str(&content)
        .map_err(|e| format!("invalid lock file {}: {}", path.display(), e))?;
    Ok(Some(lock))
}

/// Save the build lock atomically (write to temp, then rename).
pub fn save_lock(state_dir: &Path, lock: &BuildLock) -> Result<(), String> {
    std::fs::create_dir_all(state_dir)
        .map_err(|e| format!("cannot create dir {}: {}", state_dir.display(), e))?;
    let path = lock_file_path(state_dir);

    let yaml = serde_yaml_ng::to_string(lock).map_err(|e| format!("serialize error: {}", e))?;

    let tmp_path = path.with_extension("yaml.tmp");
    std::fs::write(&tmp_path, &yaml)
        .map_err(|e| format!("cannot write {}: {}", tmp_path.display(), e))?;
    std::fs::rename(&tmp_path, &path).map_err(|e| {
        format!(
            "cannot rename {} to {}: {}",
            tmp_path.display(),
            path.display(),
            e
        )
    })?;

    Ok(())
}

/// Create an empty lock for a project.
pub fn new_lock(project: &str) -> BuildLock {
    use crate::tripwire::eventlog::now_iso8601;
    BuildLock {
        schema: "1.0".to_string(),
        project: project.to_string(),
        generated_at: now_iso8601(),
        generator: format!("kiln {}", env!("CARGO_PKG_VERSION")),
        targets: indexmap::IndexMap::new(),
    }
}

/// Look up the record of a target, if the lock has one.
pub fn record<'a>(lock: Option<&'a BuildLock>, target: &str) -> Option<&'a TargetRecord> {
    lock.and_then(|l| l.targets.get(target))
}
