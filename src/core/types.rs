//! KL-001: Core types: kiln.yaml schema, build graph, plans, lock records, events.
//!
//! Config types derive Serialize/Deserialize for YAML roundtripping. Graph and
//! plan types are built from the config and never serialized.

use super::recipe::RecipeDecl;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// Top-level kiln.yaml
// ============================================================================

/// Root configuration: the declared build graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KilnConfig {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Project name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Goal built when none is given on the command line
    #[serde(default)]
    pub default: Option<String>,

    /// Global parameters (templatable)
    #[serde(default)]
    pub params: HashMap<String, serde_yaml_ng::Value>,

    /// Environment passed to every action
    #[serde(default)]
    pub env: IndexMap<String, String>,

    /// Explicit target declarations (order-preserving)
    #[serde(default)]
    pub targets: IndexMap<String, TargetDecl>,

    /// OS × arch build matrices, keyed by their aggregate goal
    #[serde(default)]
    pub matrices: IndexMap<String, MatrixDecl>,

    /// Built-in recipe instantiations
    #[serde(default)]
    pub recipes: Vec<RecipeDecl>,

    /// Execution policy
    #[serde(default)]
    pub policy: Policy,
}

// ============================================================================
// Targets
// ============================================================================

/// A single declared target as written in kiln.yaml.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetDecl {
    /// Phony targets have no artifact and always run
    #[serde(default)]
    pub phony: bool,

    /// Artifact path, relative to the project root (defaults to the name)
    #[serde(default)]
    pub path: Option<String>,

    /// Normal prerequisites: targets, files, or glob patterns
    #[serde(default)]
    pub prerequisites: Vec<String>,

    /// Order-only prerequisites: built first, never make this target stale
    #[serde(default)]
    pub order_only: Vec<String>,

    /// Shell command template
    #[serde(default)]
    pub command: Option<String>,

    /// Merge normal prerequisites into the artifact instead of running a command
    #[serde(default)]
    pub merge: Option<MergeFormat>,

    /// Extra environment for this target's command
    #[serde(default)]
    pub env: IndexMap<String, String>,

    /// Working directory, relative to the project root
    #[serde(default)]
    pub workdir: Option<String>,

    /// External binaries that must be on PATH
    #[serde(default)]
    pub requires: Vec<String>,

    /// Failures are reported but do not abort the build
    #[serde(default)]
    pub best_effort: bool,

    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
}

/// A declaration produced by the config, a matrix, or a recipe, with any extra
/// template variables it carries (`os`, `arch`, `binary`).
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredTarget {
    pub name: String,
    pub decl: TargetDecl,
    pub vars: IndexMap<String, String>,
}

impl DeclaredTarget {
    pub fn new(name: &str, decl: TargetDecl) -> Self {
        Self {
            name: name.to_string(),
            decl,
            vars: IndexMap::new(),
        }
    }
}

/// How a merge target combines its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeFormat {
    /// Go cover profiles: one `mode:` header, then every profile line
    GoCover,
    /// Plain concatenation
    Concat,
}

impl fmt::Display for MergeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GoCover => write!(f, "go-cover"),
            Self::Concat => write!(f, "concat"),
        }
    }
}

// ============================================================================
// Matrices
// ============================================================================

/// An OS × arch × binary build matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixDecl {
    pub os: Vec<String>,

    pub arch: Vec<String>,

    /// Binary names built for every platform
    pub binaries: Vec<String>,

    /// Directory artifacts are placed under
    #[serde(default)]
    pub output_dir: Option<String>,

    /// Suffix appended to binaries built for windows
    #[serde(default = "default_windows_suffix")]
    pub windows_suffix: String,

    /// Command template; may use {{os}}, {{arch}}, {{binary}}, {{artifact}}
    pub command: String,

    #[serde(default)]
    pub env: IndexMap<String, String>,

    #[serde(default)]
    pub prerequisites: Vec<String>,

    #[serde(default)]
    pub order_only: Vec<String>,

    #[serde(default)]
    pub requires: Vec<String>,
}

pub(crate) fn default_windows_suffix() -> String {
    ".exe".to_string()
}

// ============================================================================
// Policy
// ============================================================================

/// Execution policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Interpreter for command strings (`<shell> -c <command>`)
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Append build events to state/events.jsonl
    #[serde(default = "default_true")]
    pub tripwire: bool,

    /// Persist build records to state/kiln.lock.yaml
    #[serde(default = "default_true")]
    pub lock_file: bool,

    /// Rebuild a target when its command differs from the recorded one
    #[serde(default)]
    pub track_commands: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            tripwire: true,
            lock_file: true,
            track_commands: false,
        }
    }
}

fn default_shell() -> String {
    "bash".to_string()
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Build graph
// ============================================================================

/// Whether a target is backed by a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetKind {
    File { path: PathBuf },
    Phony,
}

/// A resolved shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAction {
    pub command: String,
    pub env: IndexMap<String, String>,
    pub workdir: PathBuf,
}

/// What running a target does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Command(CommandAction),
    Merge(MergeFormat),
    /// Aggregate goals that only pull in prerequisites
    Nothing,
}

impl Action {
    /// Text shown in plans and failure reports.
    pub fn describe(&self) -> String {
        match self {
            Self::Command(c) => c.command.clone(),
            Self::Merge(format) => format!("merge ({})", format),
            Self::Nothing => String::new(),
        }
    }
}

/// A node of the build graph with templates resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub kind: TargetKind,
    pub prerequisites: Vec<String>,
    pub order_only: Vec<String>,
    pub action: Action,
    pub requires: Vec<String>,
    pub best_effort: bool,
    pub description: Option<String>,
}

impl Target {
    /// Artifact path for file-backed targets.
    pub fn artifact(&self) -> Option<&Path> {
        match &self.kind {
            TargetKind::File { path } => Some(path),
            TargetKind::Phony => None,
        }
    }

    pub fn is_phony(&self) -> bool {
        self.kind == TargetKind::Phony
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Why a target will be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    Phony,
    Forced,
    Missing,
    NewerPrerequisite(String),
    PrerequisiteRebuilt(String),
    CommandChanged,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Phony => write!(f, "phony"),
            Self::Forced => write!(f, "forced"),
            Self::Missing => write!(f, "missing"),
            Self::NewerPrerequisite(p) => write!(f, "older than {}", p),
            Self::PrerequisiteRebuilt(p) => write!(f, "{} is rebuilt", p),
            Self::CommandChanged => write!(f, "command changed"),
        }
    }
}

/// A single stale target scheduled to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub target: String,
    pub reason: StaleReason,
}

/// Stale targets of a goal's closure, in dependency order.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub goal: String,

    /// Targets to run, topologically ordered
    pub steps: Vec<PlannedStep>,

    /// Targets in the closure that are already fresh
    pub up_to_date: Vec<String>,
}

impl ExecutionPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Names of the targets that will run, in order.
    pub fn targets(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.target.as_str()).collect()
    }

    pub fn contains(&self, target: &str) -> bool {
        self.steps.iter().any(|s| s.target == target)
    }
}

// ============================================================================
// Lock file
// ============================================================================

/// Build records persisted between invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildLock {
    pub schema: String,

    /// Project name
    pub project: String,

    pub generated_at: String,

    pub generator: String,

    /// Per-target records
    pub targets: IndexMap<String, TargetRecord>,
}

/// Outcome of the last run of one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetRecord {
    pub status: TargetStatus,

    #[serde(default)]
    pub built_at: Option<String>,

    #[serde(default)]
    pub duration_seconds: Option<f64>,

    /// BLAKE3 hash of the action (command, env, workdir)
    pub command_hash: String,

    /// Artifact path relative to the project root
    #[serde(default)]
    pub artifact: Option<String>,

    /// BLAKE3 hash of the artifact after a successful build
    #[serde(default)]
    pub artifact_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Built,
    Failed,
    Ignored,
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Built => write!(f, "BUILT"),
            Self::Failed => write!(f, "FAILED"),
            Self::Ignored => write!(f, "IGNORED"),
        }
    }
}

// ============================================================================
// Build events
// ============================================================================

/// Event for the JSONL build log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BuildEvent {
    BuildStarted {
        run_id: String,
        goal: String,
        steps: usize,
        kiln_version: String,
    },
    TargetStarted {
        run_id: String,
        target: String,
        reason: String,
    },
    TargetBuilt {
        run_id: String,
        target: String,
        duration_seconds: f64,
    },
    TargetFailed {
        run_id: String,
        target: String,
        error: String,
    },
    TargetIgnored {
        run_id: String,
        target: String,
        exit_code: i32,
    },
    BuildInterrupted {
        run_id: String,
        next: String,
    },
    BuildCompleted {
        run_id: String,
        built: u32,
        ignored: u32,
        success: bool,
        total_seconds: f64,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: BuildEvent,
}

// ============================================================================
// Build result
// ============================================================================

/// Result of executing a plan to completion.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub goal: String,
    pub built: Vec<String>,
    /// Best-effort targets that failed
    pub ignored: Vec<String>,
    pub total_duration: std::time::Duration,
}

// ============================================================================
// Template helper
// ============================================================================

/// Convert a serde_yaml_ng::Value to a string for template resolution.
pub fn yaml_value_to_string(val: &serde_yaml_ng::Value) -> String {
    match val {
        serde_yaml_ng::Value::String(s) => s.clone(),
        serde_yaml_ng::Value::Number(n) => n.to_string(),
        serde_yaml_ng::Value::Bool(b) => b.to_string(),
        serde_yaml_ng::Value::Null => String::new(),
        serde_yaml_ng::Value::Sequence(items) => items
            .iter()
            .map(yaml_value_to_string)
            .collect::<Vec<_>>()
            .join(" "),
        other => format!("{:?}", other),
    }
}

// ============================================================================
// Tests
// ============================================================================
