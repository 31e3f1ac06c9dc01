//! KL-009: Report merging.
//!
//! `go-cover` keeps a single `mode:` header and appends the profile lines of
//! every input in order. `concat` joins inputs as-is, making sure each one ends
//! with a newline. The output is written atomically.

use super::error::EngineError;
use super::types::MergeFormat;
use std::path::{Path, PathBuf};

const DEFAULT_COVER_MODE: &str = "mode: set";

/// What a merge produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedReport {
    pub path: PathBuf,
    /// Inputs that contributed content
    pub merged: usize,
    /// Inputs that were empty
    pub empty: usize,
}

/// Merge `inputs` into `output`. Missing inputs are an error; empty ones are skipped.
pub fn merge_reports(
    inputs: &[PathBuf],
    output: &Path,
    format: MergeFormat,
) -> Result<MergedReport, EngineError> {
    let mut contents = Vec::with_capacity(inputs.len());
    for input in inputs {
        let bytes = std::fs::read(input).map_err(|e| EngineError::io(input, e))?;
        contents.push((input.as_path(), bytes));
    }

    let empty = contents.iter().filter(|(_, b)| b.trim_ascii().is_empty()).count();
    let merged_bytes = match format {
        MergeFormat::GoCover => merge_go_cover(&contents)?,
        MergeFormat::Concat => merge_concat(&contents),
    };

    write_atomic(output, &merged_bytes)?;
    tracing::debug!(output = %output.display(), inputs = inputs.len(), %format, "merged reports");

    Ok(MergedReport {
        path: output.to_path_buf(),
        merged: contents.len() - empty,
        empty,
    })
}

/// Profile lines are copied as raw bytes; only the `mode:` header is interpreted.
fn merge_go_cover(contents: &[(&Path, Vec<u8>)]) -> Result<Vec<u8>, EngineError> {
    let mut mode: Option<&[u8]> = None;
    let mut body = Vec::new();

    for (path, bytes) in contents {
        for line in bytes.split(|b| *b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            let trimmed = line.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            if line.starts_with(b"mode:") {
                match mode {
                    None => mode = Some(trimmed),
                    Some(m) if m == trimmed => {}
                    Some(m) => {
                        return Err(EngineError::Config(format!(
                            "{}: cover mode '{}' conflicts with '{}'",
                            path.display(),
                            String::from_utf8_lossy(trimmed),
                            String::from_utf8_lossy(m)
                        )))
                    }
                }
                continue;
            }
            body.extend_from_slice(line);
            body.push(b'\n');
        }
    }

    let mut out = Vec::with_capacity(body.len() + 16);
    out.extend_from_slice(mode.unwrap_or(DEFAULT_COVER_MODE.as_bytes()));
    out.push(b'\n');
    out.extend_from_slice(&body);
    Ok(out)
}

fn merge_concat(contents: &[(&Path, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (_, bytes) in contents {
        if bytes.is_empty() {
            continue;
        }
        out.extend_from_slice(bytes);
        if bytes.last() != Some(&b'\n') {
            out.push(b'\n');
        }
    }
    out
}

fn write_atomic(output: &Path, bytes: &[u8]) -> Result<(), EngineError> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
    }
    let mut tmp = output.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes).map_err(|e| EngineError::io(&tmp, e))?;
    std::fs::rename(&tmp, output).map_err(|e| EngineError::io(output, e))
}
