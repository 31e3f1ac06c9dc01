//! KL-014: BLAKE3 hashing for artifacts and target actions.

use crate::core::types::Action;
use std::io::Read;
use std::path::Path;

const STREAM_BUF_SIZE: usize = 65536;

/// Hash a file's contents. Returns `"blake3:{hex}"`.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; STREAM_BUF_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("blake3:{}", hasher.finalize().to_hex()))
}

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Hash a directory tree: sorted walk, relative paths folded in, symlinks skipped.
pub fn hash_directory(path: &Path) -> std::io::Result<String> {
    fn walk(base: &Path, current: &Path, entries: &mut Vec<(String, String)>) -> std::io::Result<()> {
        let mut children: Vec<std::fs::DirEntry> =
            std::fs::read_dir(current)?.filter_map(|e| e.ok()).collect();
        children.sort_by_key(|e| e.file_name());

        for entry in children {
            let ft = entry.file_type()?;
            if ft.is_symlink() {
                continue;
            }
            let path = entry.path();
            let rel = path
                .strip_prefix(base)
                .unwrap_or(&path)
                .to_string_lossy()
                .to_string();
            if ft.is_dir() {
                walk(base, &path, entries)?;
            } else if ft.is_file() {
                entries.push((rel, hash_file(&path)?));
            }
        }
        Ok(())
    }

    let mut entries = Vec::new();
    walk(path, path, &mut entries)?;

    let parts: Vec<String> = entries
        .into_iter()
        .map(|(rel, hash)| format!("{}\0{}", rel, hash))
        .collect();
    let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
    Ok(composite_hash(&refs))
}

/// Hash an artifact, file or directory.
pub fn hash_path(path: &Path) -> std::io::Result<String> {
    if path.is_dir() {
        hash_directory(path)
    } else {
        hash_file(path)
    }
}

/// Compute a composite hash from multiple components.
pub fn composite_hash(components: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in components {
        hasher.update(c.as_bytes());
        hasher.update(b"\0");
    }
    format!("blake3:{}", hasher.finalize().to_hex())
}

/// Fingerprint of what a target does: command text, environment and workdir.
pub fn hash_action(action: &Action) -> String {
    match action {
        Action::Command(c) => {
            let mut parts = vec![c.command.clone(), c.workdir.to_string_lossy().to_string()];
            for (k, v) in &c.env {
                parts.push(format!("{}={}", k, v));
            }
            let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
            composite_hash(&refs)
        }
        Action::Merge(format) => hash_string(&format!("merge:{}", format)),
        Action::Nothing => hash_string(""),
    }
}
