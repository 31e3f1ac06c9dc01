//! KL-005: Executor, the orchestration loop for build.
//!
//! Runs the steps of an [`ExecutionPlan`] one at a time, in order:
//! interrupt check → requires pre-flight → action → lock record → events.
//! The first failure stops the build and removes the failed target's artifact.
//! Best-effort targets are recorded as ignored and the build goes on.

use super::error::EngineError;
use super::graph::BuildGraph;
use super::report;
use super::state;
use super::types::*;
use crate::runner::{CommandSpec, FileSystem, Runner};
use crate::tripwire::{eventlog, hasher};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Exit status shells use for "command not found".
const EXIT_NOT_FOUND: i32 = 127;

/// Everything an execution needs besides the plan.
pub struct ExecContext<'a> {
    pub graph: &'a BuildGraph,
    pub runner: &'a dyn Runner,
    pub fs: &'a dyn FileSystem,
    pub policy: &'a Policy,
    /// Where the lock and event log live; `None` disables both
    pub state_dir: Option<&'a Path>,
    /// Set by the interrupt handler; checked before each step
    pub interrupt: Option<&'a AtomicBool>,
    /// Print each command before running it
    pub echo: bool,
}

impl ExecContext<'_> {
    fn interrupted(&self) -> bool {
        self.interrupt.is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn log(&self, event: BuildEvent) {
        if let (true, Some(dir)) = (self.policy.tripwire, self.state_dir) {
            if let Err(e) = eventlog::append_event(dir, event) {
                tracing::warn!(error = %e, "could not append build event");
            }
        }
    }
}

/// Mutable bookkeeping for one run.
struct Run {
    id: String,
    goal: String,
    lock: BuildLock,
    built: Vec<String>,
    ignored: Vec<String>,
    start: Instant,
}

/// Execute a plan. Returns the report, or the error that stopped the build.
pub fn execute(ctx: &ExecContext, plan: &ExecutionPlan) -> Result<BuildReport, EngineError> {
    let lock = match (ctx.policy.lock_file, ctx.state_dir) {
        (true, Some(dir)) => state::load_lock(dir).map_err(EngineError::State)?,
        _ => None,
    };
    let mut run = Run {
        id: eventlog::generate_run_id(),
        goal: plan.goal.clone(),
        lock: lock.unwrap_or_else(|| state::new_lock(&ctx.graph.name)),
        built: Vec::new(),
        ignored: Vec::new(),
        start: Instant::now(),
    };

    tracing::info!(goal = %plan.goal, steps = plan.steps.len(), run_id = %run.id, "build started");
    ctx.log(BuildEvent::BuildStarted {
        run_id: run.id.clone(),
        goal: plan.goal.clone(),
        steps: plan.steps.len(),
        kiln_version: env!("CARGO_PKG_VERSION").to_string(),
    });

    for step in &plan.steps {
        if ctx.interrupted() {
            ctx.log(BuildEvent::BuildInterrupted {
                run_id: run.id.clone(),
                next: step.target.clone(),
            });
            return finish(
                ctx,
                run,
                Err(EngineError::Interrupted {
                    next: step.target.clone(),
                }),
            );
        }

        let target = ctx
            .graph
            .get(&step.target)
            .ok_or_else(|| EngineError::UnknownTarget {
                name: step.target.clone(),
                needed_by: None,
            })?;

        ctx.log(BuildEvent::TargetStarted {
            run_id: run.id.clone(),
            target: target.name.clone(),
            reason: step.reason.to_string(),
        });

        let started = Instant::now();
        let outcome = preflight(ctx, target).and_then(|()| {
            run_action(ctx, target).inspect_err(|_| discard_artifact(ctx, target))
        });
        let duration = started.elapsed().as_secs_f64();

        match outcome {
            Ok(()) => {
                record(ctx, &mut run.lock, target, TargetStatus::Built, duration);
                ctx.log(BuildEvent::TargetBuilt {
                    run_id: run.id.clone(),
                    target: target.name.clone(),
                    duration_seconds: duration,
                });
                run.built.push(target.name.clone());
            }
            Err(e) if target.best_effort && is_tolerable(&e) && !ctx.interrupted() => {
                tracing::warn!(target = %target.name, error = %e, "ignoring failure of best-effort target");
                record(ctx, &mut run.lock, target, TargetStatus::Ignored, duration);
                ctx.log(BuildEvent::TargetIgnored {
                    run_id: run.id.clone(),
                    target: target.name.clone(),
                    exit_code: exit_code_of(&e),
                });
                run.ignored.push(target.name.clone());
            }
            Err(e) => {
                record(ctx, &mut run.lock, target, TargetStatus::Failed, duration);
                let e = if ctx.interrupted() {
                    EngineError::Interrupted {
                        next: target.name.clone(),
                    }
                } else {
                    e
                };
                ctx.log(BuildEvent::TargetFailed {
                    run_id: run.id.clone(),
                    target: target.name.clone(),
                    error: e.to_string(),
                });
                return finish(ctx, run, Err(e));
            }
        }
    }

    finish(ctx, run, Ok(()))
}

/// Log completion, persist the lock, and build the report.
fn finish(
    ctx: &ExecContext,
    run: Run,
    result: Result<(), EngineError>,
) -> Result<BuildReport, EngineError> {
    let total = run.start.elapsed();
    ctx.log(BuildEvent::BuildCompleted {
        run_id: run.id.clone(),
        built: run.built.len() as u32,
        ignored: run.ignored.len() as u32,
        success: result.is_ok(),
        total_seconds: total.as_secs_f64(),
    });

    if let (true, Some(dir)) = (ctx.policy.lock_file, ctx.state_dir) {
        let mut lock = run.lock;
        lock.generated_at = eventlog::now_iso8601();
        state::save_lock(dir, &lock).map_err(EngineError::State)?;
    }

    result?;
    tracing::info!(built = run.built.len(), ignored = run.ignored.len(), "build finished");
    Ok(BuildReport {
        goal: run.goal,
        built: run.built,
        ignored: run.ignored,
        total_duration: total,
    })
}

/// Every collaborator in `requires` must be on PATH.
fn preflight(ctx: &ExecContext, target: &Target) -> Result<(), EngineError> {
    match target.requires.iter().find(|p| !ctx.runner.locate(p)) {
        Some(program) => Err(EngineError::MissingCollaborator {
            target: target.name.clone(),
            program: program.clone(),
        }),
        None => Ok(()),
    }
}

fn run_action(ctx: &ExecContext, target: &Target) -> Result<(), EngineError> {
    if let Some(parent) = target.artifact().and_then(Path::parent) {
        ctx.fs.create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
    }

    match &target.action {
        Action::Nothing => Ok(()),
        Action::Merge(format) => {
            let output = target.artifact().ok_or_else(|| {
                EngineError::Config(format!("merge target '{}' has no artifact", target.name))
            })?;
            let inputs = ctx.graph.merge_inputs(target);
            if ctx.echo {
                println!("merge ({}) {} input(s) -> {}", format, inputs.len(), ctx.graph.relative(output));
            }
            let merged = report::merge_reports(&inputs, output, *format)?;
            if merged.empty > 0 {
                tracing::debug!(target = %target.name, empty = merged.empty, "skipped empty inputs");
            }
            Ok(())
        }
        Action::Command(cmd) => run_command(ctx, target, cmd),
    }
}

fn run_command(ctx: &ExecContext, target: &Target, cmd: &CommandAction) -> Result<(), EngineError> {
    if !ctx.fs.is_dir(&cmd.workdir) {
        return Err(EngineError::io(
            &cmd.workdir,
            std::io::Error::new(std::io::ErrorKind::NotFound, "working directory does not exist"),
        ));
    }
    if ctx.echo {
        println!("{}", cmd.command);
    }

    let spec = CommandSpec::shell(
        &ctx.policy.shell,
        &cmd.command,
        cmd.workdir.clone(),
        cmd.env.clone(),
    );
    let out = ctx.runner.run(&spec).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => EngineError::MissingCollaborator {
            target: target.name.clone(),
            program: spec.program().to_string(),
        },
        _ => EngineError::io(&cmd.workdir, e),
    })?;

    print!("{}", out.stdout);
    eprint!("{}", out.stderr);

    match out.exit_code {
        0 => Ok(()),
        EXIT_NOT_FOUND => Err(EngineError::MissingCollaborator {
            target: target.name.clone(),
            program: cmd
                .command
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string(),
        }),
        code => Err(EngineError::ActionFailed {
            target: target.name.clone(),
            command: cmd.command.clone(),
            exit_code: code,
        }),
    }
}

/// Remove a failed target's artifact so the next run retries it.
fn discard_artifact(ctx: &ExecContext, target: &Target) {
    if target.best_effort {
        return;
    }
    if let Some(path) = target.artifact() {
        match ctx.fs.remove(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed artifact of failed target"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove artifact"),
        }
    }
}

fn is_tolerable(e: &EngineError) -> bool {
    matches!(
        e,
        EngineError::ActionFailed { .. } | EngineError::MissingCollaborator { .. }
    )
}

fn exit_code_of(e: &EngineError) -> i32 {
    match e {
        EngineError::ActionFailed { exit_code, .. } => *exit_code,
        EngineError::MissingCollaborator { .. } => EXIT_NOT_FOUND,
        _ => -1,
    }
}

fn record(ctx: &ExecContext, lock: &mut BuildLock, target: &Target, status: TargetStatus, duration: f64) {
    let artifact_hash = match (status, target.artifact()) {
        (TargetStatus::Built, Some(path)) => hasher::hash_path(path).ok(),
        _ => None,
    };
    lock.targets.insert(
        target.name.clone(),
        TargetRecord {
            status,
            built_at: Some(eventlog::now_iso8601()),
            duration_seconds: Some(duration),
            command_hash: hasher::hash_action(&target.action),
            artifact: target.artifact().map(|p| ctx.graph.relative(p)),
            artifact_hash,
        },
    );
}
