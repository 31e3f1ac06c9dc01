//! KL-016: Drift detection: artifacts changed outside the build since it last ran.

use crate::core::types::{BuildLock, TargetStatus};
use crate::tripwire::hasher;
use std::path::Path;

/// A single drift finding.
#[derive(Debug, Clone)]
pub struct DriftFinding {
    pub target: String,
    pub expected_hash: String,
    pub actual_hash: String,
    pub detail: String,
}

/// Check one artifact against its recorded hash.
pub fn check_artifact_drift(
    target: &str,
    path: &Path,
    expected_hash: &str,
) -> Option<DriftFinding> {
    if !path.exists() {
        return Some(DriftFinding {
            target: target.to_string(),
            expected_hash: expected_hash.to_string(),
            actual_hash: "MISSING".to_string(),
            detail: format!("{} does not exist", path.display()),
        });
    }

    let actual = hasher::hash_path(path).unwrap_or_else(|e| format!("ERROR:{}", e));
    if actual == expected_hash {
        return None;
    }
    Some(DriftFinding {
        target: target.to_string(),
        expected_hash: expected_hash.to_string(),
        actual_hash: actual,
        detail: format!("{} changed since it was built", path.display()),
    })
}

/// Check every built artifact in the lock. Paths are relative to `root`.
pub fn detect_drift(lock: &BuildLock, root: &Path) -> Vec<DriftFinding> {
    lock.targets
        .iter()
        .filter(|(_, rec)| rec.status == TargetStatus::Built)
        .filter_map(|(name, rec)| {
            let artifact = rec.artifact.as_deref()?;
            let expected = rec.artifact_hash.as_deref()?;
            check_artifact_drift(name, &root.join(artifact), expected)
        })
        .collect()
}
