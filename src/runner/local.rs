//! KL-010: Local process runner.

use super::{CommandSpec, ExecOutput, Runner};
use std::process::{Command, Stdio};

/// Spawns commands on this machine, capturing stdout and stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRunner;

impl Runner for LocalRunner {
    fn run(&self, spec: &CommandSpec) -> std::io::Result<ExecOutput> {
        exec_local(spec)
    }

    fn locate(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Execute a command locally and wait for it.
pub fn exec_local(spec: &CommandSpec) -> std::io::Result<ExecOutput> {
    let (program, args) = spec.argv.split_first().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argv")
    })?;

    tracing::debug!(program = %program, workdir = %spec.workdir.display(), "spawning");

    let output = Command::new(program)
        .args(args)
        .current_dir(&spec.workdir)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;

    Ok(ExecOutput {
        // Killed by signal: no exit code
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use std::path::PathBuf;

    fn bash(script: &str) -> CommandSpec {
        CommandSpec::shell("bash", script, std::env::temp_dir(), IndexMap::new())
    }

    #[test]
    fn test_kl010_local_echo() {
        let out = exec_local(&bash("echo hello")).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn test_kl010_local_failure() {
        let out = exec_local(&bash("exit 42")).unwrap();
        assert!(!out.success());
        assert_eq!(out.exit_code, 42);
    }

    #[test]
    fn test_kl010_local_stderr() {
        let out = exec_local(&bash("echo err >&2")).unwrap();
        assert!(out.success());
        assert!(out.stderr.contains("err"));
    }

    #[test]
    fn test_kl010_local_signal_killed() {
        let out = exec_local(&bash("kill -9 $$")).unwrap();
        assert_eq!(out.exit_code, -1);
    }

    #[test]
    fn test_kl010_local_pipefail() {
        let out = exec_local(&bash("set -euo pipefail\nfalse | true")).unwrap();
        assert!(!out.success(), "pipefail should catch false in pipeline");
    }

    #[test]
    fn test_kl010_local_env_and_workdir() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = IndexMap::new();
        env.insert("GOOS".to_string(), "windows".to_string());
        let spec = CommandSpec::shell(
            "bash",
            "echo $GOOS; pwd",
            dir.path().to_path_buf(),
            env,
        );
        let out = exec_local(&spec).unwrap();
        let lines: Vec<_> = out.stdout.lines().collect();
        assert_eq!(lines[0], "windows");
        let canonical = dir.path().canonicalize().unwrap();
        assert_eq!(PathBuf::from(lines[1]).canonicalize().unwrap(), canonical);
    }

    #[test]
    fn test_kl010_spawn_missing_program() {
        let spec = CommandSpec {
            argv: vec!["kiln-definitely-not-installed".to_string()],
            workdir: std::env::temp_dir(),
            env: IndexMap::new(),
        };
        let err = exec_local(&spec).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_kl010_locate() {
        assert!(LocalRunner.locate("bash"));
        assert!(!LocalRunner.locate("kiln-definitely-not-installed"));
    }
}
