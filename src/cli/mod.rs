//! KL-017: CLI subcommands: init, validate, plan, build, matrix, merge, status, drift.

use crate::core::graph::BuildGraph;
use crate::core::matrix;
use crate::core::planner::{self, PlanOptions};
use crate::core::types::{ExecutionPlan, KilnConfig, MergeFormat};
use crate::core::{executor, parser, report, state};
use crate::runner::{HostFs, LocalRunner};
use crate::tripwire::drift;
use clap::{CommandFactory, Parser, Subcommand};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

#[derive(Parser, Debug)]
#[command(
    name = "kiln",
    version,
    about = "Rust-native build orchestration: timestamp DAG, matrix builds, merged coverage reports"
)]
pub struct Cli {
    /// Show debug logs (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new kiln project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate kiln.yaml without running anything
    Validate {
        /// Path to kiln.yaml
        #[arg(short, long, default_value = "kiln.yaml")]
        file: PathBuf,
    },

    /// Show which targets a goal would rebuild, and why
    Plan {
        /// Goal to plan (default: the configured default goal)
        goal: Option<String>,

        /// Path to kiln.yaml
        #[arg(short, long, default_value = "kiln.yaml")]
        file: PathBuf,

        /// Treat every target as stale
        #[arg(long)]
        force: bool,

        /// State directory (default: state/ next to kiln.yaml)
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },

    /// Build goals, running only stale targets
    Build {
        /// Goals to build, in order (default: the configured default goal)
        goals: Vec<String>,

        /// Path to kiln.yaml
        #[arg(short, long, default_value = "kiln.yaml")]
        file: PathBuf,

        /// Rebuild every target in the closure
        #[arg(long)]
        force: bool,

        /// Show what would be executed without running
        #[arg(long)]
        dry_run: bool,

        /// State directory (default: state/ next to kiln.yaml)
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },

    /// Print the targets an OS × arch × binary matrix expands to
    Matrix {
        /// Operating systems (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        os: Vec<String>,

        /// Architectures (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        arch: Vec<String>,

        /// Binary names (comma-separated)
        #[arg(long = "bin", value_delimiter = ',', required = true)]
        binaries: Vec<String>,
    },

    /// Merge per-unit coverage profiles or logs into one file
    Merge {
        /// go-cover or concat
        #[arg(long, default_value = "go-cover", value_parser = parse_merge_format)]
        format: MergeFormat,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Input files, in order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Show the last recorded build state
    Status {
        /// Path to kiln.yaml
        #[arg(short, long, default_value = "kiln.yaml")]
        file: PathBuf,

        /// State directory (default: state/ next to kiln.yaml)
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },

    /// Detect artifacts modified outside the build (tripwire)
    Drift {
        /// Path to kiln.yaml (artifact paths are relative to its directory)
        #[arg(short, long, default_value = "kiln.yaml")]
        file: PathBuf,

        /// State directory (default: state/ next to kiln.yaml)
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Exit non-zero on any drift (for CI/cron)
        #[arg(long)]
        tripwire: bool,
    },

    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn parse_merge_format(s: &str) -> Result<MergeFormat, String> {
    match s {
        "go-cover" => Ok(MergeFormat::GoCover),
        "concat" => Ok(MergeFormat::Concat),
        other => Err(format!("unknown merge format '{}' (go-cover, concat)", other)),
    }
}

/// Dispatch a CLI command. `interrupt` is raised by the Ctrl-C handler.
pub fn dispatch(cmd: Commands, interrupt: &AtomicBool) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Plan {
            goal,
            file,
            force,
            state_dir,
        } => cmd_plan(&file, &state_dir_for(&file, state_dir)?, goal.as_deref(), force),
        Commands::Build {
            goals,
            file,
            force,
            dry_run,
            state_dir,
        } => {
            let state_dir = state_dir_for(&file, state_dir)?;
            cmd_build(&file, &state_dir, &goals, force, dry_run, interrupt)
        }
        Commands::Matrix { os, arch, binaries } => {
            cmd_matrix(&os, &arch, &binaries);
            Ok(())
        }
        Commands::Merge {
            format,
            output,
            inputs,
        } => cmd_merge(&inputs, &output, format),
        Commands::Status { file, state_dir } => cmd_status(&state_dir_for(&file, state_dir)?),
        Commands::Drift {
            file,
            state_dir,
            tripwire,
        } => cmd_drift(&file, &state_dir_for(&file, state_dir)?, tripwire),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "kiln", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join("kiln.yaml");
    if config_path.exists() {
        return Err(format!("{} already exists", config_path.display()));
    }

    let state_dir = path.join("state");
    std::fs::create_dir_all(&state_dir).map_err(|e| format!("cannot create state dir: {}", e))?;

    let template = r#"version: "1.0"
name: my-project
description: "Built with kiln"
default: all

params:
  out: build

targets:
  all:
    phony: true
    prerequisites: [hello]
  hello:
    path: "{{params.out}}/hello.txt"
    command: echo hello > {{artifact}}

policy:
  shell: bash
  tripwire: true
  lock_file: true
"#;
    std::fs::write(&config_path, template)
        .map_err(|e| format!("cannot write {}: {}", config_path.display(), e))?;

    println!("Initialized kiln project at {}", path.display());
    println!("  Created: {}", config_path.display());
    println!("  Created: {}/", state_dir.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let config = parser::parse_config_file(file)?;
    let errors = parser::validate_config(&config);

    if errors.is_empty() {
        println!(
            "OK: {} ({} targets, {} matrices, {} recipes)",
            config.name,
            config.targets.len(),
            config.matrices.len(),
            config.recipes.len()
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

/// Parse and validate a kiln config file, returning errors if invalid.
fn parse_and_validate(file: &Path) -> Result<KilnConfig, String> {
    let config = parser::parse_config_file(file)?;
    let errors = parser::validate_config(&config);
    if errors.is_empty() {
        return Ok(config);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err("validation failed".to_string())
}

/// Directory the config lives in; artifact paths are relative to it.
fn project_root(file: &Path) -> Result<PathBuf, String> {
    let dir = match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::canonicalize(dir).map_err(|e| format!("cannot resolve {}: {}", dir.display(), e))
}

/// `--state-dir` if given, else `state/` beside the config, as `init` lays it out.
fn state_dir_for(file: &Path, state_dir: Option<PathBuf>) -> Result<PathBuf, String> {
    match state_dir {
        Some(dir) => Ok(dir),
        None => Ok(project_root(file)?.join("state")),
    }
}

fn load_graph(file: &Path) -> Result<(KilnConfig, BuildGraph), String> {
    let config = parse_and_validate(file)?;
    let root = project_root(file)?;
    let graph = BuildGraph::from_config(&config, &root).map_err(|e| e.to_string())?;
    Ok((config, graph))
}

fn default_goal(graph: &BuildGraph) -> Result<String, String> {
    graph
        .default_goal()
        .map(str::to_string)
        .ok_or_else(|| "no targets declared".to_string())
}

fn cmd_plan(file: &Path, state_dir: &Path, goal: Option<&str>, force: bool) -> Result<(), String> {
    let (config, graph) = load_graph(file)?;
    let goal = match goal {
        Some(g) => g.to_string(),
        None => default_goal(&graph)?,
    };
    let lock = state::load_lock(state_dir)?;
    let opts = PlanOptions {
        force,
        lock: lock.as_ref(),
        track_commands: config.policy.track_commands,
    };
    let plan = planner::plan(&graph, &goal, &HostFs, opts).map_err(|e| e.to_string())?;
    print_plan(&graph, &plan);
    Ok(())
}

/// Display a plan to stdout.
fn print_plan(graph: &BuildGraph, plan: &ExecutionPlan) {
    println!(
        "Planning: {} -> {} ({} targets)",
        graph.name,
        plan.goal,
        plan.steps.len() + plan.up_to_date.len()
    );
    println!();
    for step in &plan.steps {
        let action = graph
            .get(&step.target)
            .map(|t| t.action.describe())
            .unwrap_or_default();
        println!("  + {} ({})", step.target, step.reason);
        if !action.is_empty() {
            println!("      {}", action);
        }
    }
    for name in &plan.up_to_date {
        println!("  = {}", name);
    }
    println!();
    println!(
        "Plan: {} to build, {} up to date.",
        plan.steps.len(),
        plan.up_to_date.len()
    );
}

fn cmd_build(
    file: &Path,
    state_dir: &Path,
    goals: &[String],
    force: bool,
    dry_run: bool,
    interrupt: &AtomicBool,
) -> Result<(), String> {
    let (config, graph) = load_graph(file)?;
    let goals = if goals.is_empty() {
        vec![default_goal(&graph)?]
    } else {
        goals.to_vec()
    };

    let ctx = executor::ExecContext {
        graph: &graph,
        runner: &LocalRunner,
        fs: &HostFs,
        policy: &config.policy,
        state_dir: Some(state_dir),
        interrupt: Some(interrupt),
        echo: true,
    };

    if dry_run {
        for plan in dry_run_plans(&config, &graph, state_dir, &goals, force)? {
            print_plan(&graph, &plan);
        }
        println!("Dry run: nothing executed.");
        return Ok(());
    }

    // A target runs at most once per invocation, even when several goals share it.
    let mut done: HashSet<String> = HashSet::new();
    for goal in &goals {
        let lock = state::load_lock(state_dir)?;
        let opts = PlanOptions {
            force,
            lock: lock.as_ref(),
            track_commands: config.policy.track_commands,
        };
        let mut plan = planner::plan(&graph, goal, &HostFs, opts).map_err(|e| e.to_string())?;
        plan.steps.retain(|s| !done.contains(&s.target));

        if plan.is_empty() {
            println!("'{}' is up to date.", plan.goal);
            continue;
        }

        let report = executor::execute(&ctx, &plan).map_err(|e| e.to_string())?;
        done.extend(report.built.iter().cloned());
        done.extend(report.ignored.iter().cloned());
        if report.ignored.is_empty() {
            println!(
                "Build complete: {} built ({:.1}s).",
                report.built.len(),
                report.total_duration.as_secs_f64()
            );
        } else {
            println!(
                "Build complete: {} built, {} ignored: {} ({:.1}s).",
                report.built.len(),
                report.ignored.len(),
                report.ignored.join(", "),
                report.total_duration.as_secs_f64()
            );
        }
    }

    Ok(())
}

/// Plans for each goal as a real run would execute them: a step planned for
/// an earlier goal is not repeated.
fn dry_run_plans(
    config: &KilnConfig,
    graph: &BuildGraph,
    state_dir: &Path,
    goals: &[String],
    force: bool,
) -> Result<Vec<ExecutionPlan>, String> {
    let lock = state::load_lock(state_dir)?;
    let opts = PlanOptions {
        force,
        lock: lock.as_ref(),
        track_commands: config.policy.track_commands,
    };
    let mut done: HashSet<String> = HashSet::new();
    let mut plans = Vec::with_capacity(goals.len());
    for goal in goals {
        let mut plan = planner::plan(graph, goal, &HostFs, opts).map_err(|e| e.to_string())?;
        plan.steps.retain(|s| !done.contains(&s.target));
        done.extend(plan.steps.iter().map(|s| s.target.clone()));
        plans.push(plan);
    }
    Ok(plans)
}

fn cmd_matrix(os: &[String], arch: &[String], binaries: &[String]) {
    for entry in matrix::expand_matrix(os, arch, binaries) {
        println!("{}", entry.target_name());
    }
}

fn cmd_merge(inputs: &[PathBuf], output: &Path, format: MergeFormat) -> Result<(), String> {
    let merged = report::merge_reports(inputs, output, format).map_err(|e| e.to_string())?;
    println!(
        "Merged {} input(s) into {} ({} empty)",
        merged.merged + merged.empty,
        merged.path.display(),
        merged.empty
    );
    Ok(())
}

fn cmd_status(state_dir: &Path) -> Result<(), String> {
    let lock = match state::load_lock(state_dir)? {
        Some(lock) => lock,
        None => {
            println!("No state found. Run `kiln build` first.");
            return Ok(());
        }
    };

    println!("Project: {}", lock.project);
    println!("  Generated: {}", lock.generated_at);
    println!("  Generator: {}", lock.generator);
    println!("  Targets: {}", lock.targets.len());
    for (name, rec) in &lock.targets {
        let duration = rec
            .duration_seconds
            .map(|d| format!(" ({:.2}s)", d))
            .unwrap_or_default();
        let artifact = rec
            .artifact
            .as_deref()
            .map(|a| format!(" -> {}", a))
            .unwrap_or_default();
        println!("    {}: {}{}{}", name, rec.status, artifact, duration);
    }
    Ok(())
}

fn cmd_drift(file: &Path, state_dir: &Path, tripwire_mode: bool) -> Result<(), String> {
    let root = project_root(file)?;
    let lock = match state::load_lock(state_dir)? {
        Some(lock) => lock,
        None => {
            println!("No state found. Run `kiln build` first.");
            return Ok(());
        }
    };

    println!("Checking {} ({} targets)...", lock.project, lock.targets.len());
    let findings = drift::detect_drift(&lock, &root);
    if findings.is_empty() {
        println!("No drift detected.");
        return Ok(());
    }

    for f in &findings {
        println!("  DRIFTED: {} ({})", f.target, f.detail);
        println!("    Expected: {}", f.expected_hash);
        println!("    Actual:   {}", f.actual_hash);
    }
    println!();
    println!("Drift detected: {} target(s)", findings.len());
    if tripwire_mode {
        return Err(format!("{} drift finding(s)", findings.len()));
    }
    Ok(())
}
