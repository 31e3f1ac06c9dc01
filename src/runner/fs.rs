//! KL-011: Filesystem seam: artifact timestamps, removal, and output directories.

use std::path::Path;
use std::time::SystemTime;

/// The filesystem operations the engine needs.
pub trait FileSystem {
    /// Modification time, or `None` if the path does not exist.
    fn stat(&self, path: &Path) -> std::io::Result<Option<SystemTime>>;

    /// Remove a file artifact. Missing files and directories are left alone.
    fn remove(&self, path: &Path) -> std::io::Result<()>;

    /// Create `path` and any missing parents.
    fn create_dir_all(&self, path: &Path) -> std::io::Result<()>;

    fn is_dir(&self, path: &Path) -> bool;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostFs;

impl FileSystem for HostFs {
    fn stat(&self, path: &Path) -> std::io::Result<Option<SystemTime>> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(Some(meta.modified()?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn remove(&self, path: &Path) -> std::io::Result<()> {
        match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => std::fs::remove_file(path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }
}
