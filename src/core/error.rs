//! KL-007: Engine error kinds.
//!
//! Every variant aborts the current invocation. The CLI prints them with
//! `Display`; tests match on the variant.

use std::path::PathBuf;

/// Errors raised while resolving or executing a build graph.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A goal or prerequisite names neither a target nor an existing file.
    #[error("no rule to make target '{name}'{}", needed_by_suffix(.needed_by))]
    UnknownTarget {
        name: String,
        needed_by: Option<String>,
    },

    /// The prerequisite graph contains a cycle. `cycle` starts and ends on
    /// the same target.
    #[error("dependency cycle detected: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// A target's action exited non-zero.
    #[error("target '{target}' failed (exit code {exit_code}): {command}")]
    ActionFailed {
        target: String,
        command: String,
        exit_code: i32,
    },

    /// An external binary an action needs is not installed.
    #[error("target '{target}' needs '{program}', which was not found on PATH")]
    MissingCollaborator { target: String, program: String },

    /// An interrupt arrived; `next` is the target that did not start.
    #[error("interrupted before target '{next}'")]
    Interrupted { next: String },

    /// Filesystem error while producing or removing an artifact.
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid graph configuration (bad template, bad glob, duplicate name).
    #[error("{0}")]
    Config(String),

    /// The build lock could not be read or written.
    #[error("state: {0}")]
    State(String),
}

fn needed_by_suffix(needed_by: &Option<String>) -> String {
    match needed_by {
        Some(parent) => format!(", needed by '{}'", parent),
        None => String::new(),
    }
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
