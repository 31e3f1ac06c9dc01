//! KL-010: Collaborator seams: command execution and filesystem access.
//!
//! The executor spawns processes and touches artifacts through [`Runner`] and
//! [`FileSystem`] so tests can observe every invocation. Report merging reads
//! and writes its files directly.

pub mod fs;
pub mod local;

use indexmap::IndexMap;
use std::path::PathBuf;

pub use fs::{FileSystem, HostFs};
pub use local::LocalRunner;

/// One invocation of an external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub workdir: PathBuf,
    pub env: IndexMap<String, String>,
}

impl CommandSpec {
    /// Wrap a command string for `<shell> -c`.
    pub fn shell(
        shell: &str,
        command: &str,
        workdir: PathBuf,
        env: IndexMap<String, String>,
    ) -> Self {
        Self {
            argv: vec![shell.to_string(), "-c".to_string(), command.to_string()],
            workdir,
            env,
        }
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }
}

/// Output from executing a command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external commands on behalf of target actions.
pub trait Runner {
    /// Run to completion. `Err` means the process could not be spawned.
    fn run(&self, spec: &CommandSpec) -> std::io::Result<ExecOutput>;

    /// Whether `program` can be found on PATH.
    fn locate(&self, program: &str) -> bool;
}
