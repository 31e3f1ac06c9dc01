//! KL-004: Execution planner. Decides which targets of a goal's closure are stale.
//!
//! A target is stale when it is phony, when its artifact is missing, when a
//! normal prerequisite's file is strictly newer, or when a normal prerequisite
//! is itself about to be rebuilt. Order-only prerequisites are scheduled but
//! never make a dependent stale.

use super::error::EngineError;
use super::graph::BuildGraph;
use super::resolver::build_order;
use super::state;
use super::types::*;
use crate::runner::FileSystem;
use crate::tripwire::hasher;
use std::collections::HashSet;
use std::path::Path;
use std::time::SystemTime;

/// Knobs for a planning pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOptions<'a> {
    /// Treat every target in the closure as stale
    pub force: bool,
    /// Records from the previous run
    pub lock: Option<&'a BuildLock>,
    /// Rebuild targets whose action hash differs from the recorded one
    pub track_commands: bool,
}

/// Resolve `goal` and keep the stale targets, in dependency order.
pub fn plan(
    graph: &BuildGraph,
    goal: &str,
    fs: &dyn FileSystem,
    opts: PlanOptions<'_>,
) -> Result<ExecutionPlan, EngineError> {
    let order = build_order(graph, goal, fs)?;
    let goal_name = order.last().cloned().unwrap_or_else(|| goal.to_string());

    let mut rebuilt: HashSet<&str> = HashSet::new();
    let mut steps = Vec::new();
    let mut up_to_date = Vec::new();

    for name in &order {
        let target = graph.get(name).ok_or_else(|| EngineError::UnknownTarget {
            name: name.clone(),
            needed_by: None,
        })?;
        match stale_reason(graph, target, fs, &rebuilt, opts)? {
            Some(reason) => {
                tracing::debug!(target = %name, %reason, "stale");
                rebuilt.insert(name.as_str());
                steps.push(PlannedStep {
                    target: name.clone(),
                    reason,
                });
            }
            None => up_to_date.push(name.clone()),
        }
    }

    Ok(ExecutionPlan {
        goal: goal_name,
        steps,
        up_to_date,
    })
}

/// Whether building `name` would run its action.
pub fn is_stale(graph: &BuildGraph, name: &str, fs: &dyn FileSystem) -> Result<bool, EngineError> {
    let p = plan(graph, name, fs, PlanOptions::default())?;
    Ok(p.contains(&p.goal))
}

fn stale_reason(
    graph: &BuildGraph,
    target: &Target,
    fs: &dyn FileSystem,
    rebuilt: &HashSet<&str>,
    opts: PlanOptions<'_>,
) -> Result<Option<StaleReason>, EngineError> {
    if opts.force {
        return Ok(Some(StaleReason::Forced));
    }
    let artifact = match target.artifact() {
        Some(path) => path,
        None => return Ok(Some(StaleReason::Phony)),
    };
    let built = match mtime(fs, artifact)? {
        Some(t) => t,
        None => return Ok(Some(StaleReason::Missing)),
    };

    if opts.track_commands {
        if let Some(rec) = state::record(opts.lock, &target.name) {
            if rec.command_hash != hasher::hash_action(&target.action) {
                return Ok(Some(StaleReason::CommandChanged));
            }
        }
    }

    for prereq in &target.prerequisites {
        let path = match graph.lookup(prereq) {
            Some(dep) if rebuilt.contains(dep.name.as_str()) => {
                return Ok(Some(StaleReason::PrerequisiteRebuilt(prereq.clone())));
            }
            Some(dep) => match dep.artifact() {
                Some(p) => p.to_path_buf(),
                None => continue,
            },
            None => graph.source_path(prereq),
        };
        if let Some(t) = mtime(fs, &path)? {
            if t > built {
                return Ok(Some(StaleReason::NewerPrerequisite(prereq.clone())));
            }
        }
    }

    Ok(None)
}

fn mtime(fs: &dyn FileSystem, path: &Path) -> Result<Option<SystemTime>, EngineError> {
    fs.stat(path).map_err(|e| EngineError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::tests::{file_target, phony_target};
    use crate::runner::HostFs;
    use proptest::prelude::*;
    use std::time::Duration;

    fn touch(root: &Path, name: &str, secs: u64) {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, name).unwrap();
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    fn graph(root: &Path, targets: Vec<Target>) -> BuildGraph {
        let mut g = BuildGraph::new("test", root);
        for t in targets {
            g.insert(t).unwrap();
        }
        g
    }

    fn run(g: &BuildGraph, goal: &str) -> ExecutionPlan {
        plan(g, goal, &HostFs, PlanOptions::default()).unwrap()
    }

    #[test]
    fn test_kl004_no_prereqs_depends_on_existence() {
        let dir = tempfile::tempdir().unwrap();
        let g = graph(dir.path(), vec![file_target(dir.path(), "out.txt", &[])]);

        let p = run(&g, "out.txt");
        assert_eq!(p.steps[0].reason, StaleReason::Missing);

        touch(dir.path(), "out.txt", 1);
        assert!(run(&g, "out.txt").is_empty());
    }

    #[test]
    fn test_kl004_newer_artifact_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "main.go", 100);
        touch(dir.path(), "app", 200);
        let g = graph(dir.path(), vec![file_target(dir.path(), "app", &["main.go"])]);

        let p = run(&g, "app");
        assert!(p.is_empty());
        assert_eq!(p.up_to_date, vec!["app"]);
        // Same answer the second time.
        assert!(run(&g, "app").is_empty());
    }

    #[test]
    fn test_kl004_equal_mtime_not_stale() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "main.go", 100);
        touch(dir.path(), "app", 100);
        let g = graph(dir.path(), vec![file_target(dir.path(), "app", &["main.go"])]);
        assert!(run(&g, "app").is_empty());
    }

    #[test]
    fn test_kl004_newer_source_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "app", 100);
        touch(dir.path(), "main.go", 200);
        let g = graph(dir.path(), vec![file_target(dir.path(), "app", &["main.go"])]);
        let p = run(&g, "app");
        assert_eq!(
            p.steps,
            vec![PlannedStep {
                target: "app".into(),
                reason: StaleReason::NewerPrerequisite("main.go".into()),
            }]
        );
    }

    #[test]
    fn test_kl004_deleted_artifact_plans_it_and_phony_goal() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "main.go", 100);
        touch(dir.path(), "lib.a", 150);
        touch(dir.path(), "app", 200);
        let g = graph(
            dir.path(),
            vec![
                phony_target("all", &["app"]),
                file_target(dir.path(), "app", &["main.go", "lib.a"]),
                file_target(dir.path(), "lib.a", &[]),
            ],
        );
        assert_eq!(run(&g, "all").targets(), vec!["all"]);

        std::fs::remove_file(dir.path().join("app")).unwrap();
        assert_eq!(run(&g, "all").targets(), vec!["app", "all"]);
    }

    #[test]
    fn test_kl004_rebuilt_prerequisite_propagates() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b", 200);
        touch(dir.path(), "c", 300);
        let g = graph(
            dir.path(),
            vec![
                file_target(dir.path(), "a", &[]),
                file_target(dir.path(), "b", &["a"]),
                file_target(dir.path(), "c", &["b"]),
            ],
        );
        let p = run(&g, "c");
        assert_eq!(p.targets(), vec!["a", "b", "c"]);
        assert_eq!(p.steps[1].reason, StaleReason::PrerequisiteRebuilt("a".into()));
    }

    #[test]
    fn test_kl004_order_only_never_propagates() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "app", 100);
        touch(dir.path(), "vendor.stamp", 500);
        let mut app = file_target(dir.path(), "app", &[]);
        app.order_only = vec!["vendor".into(), "vendor.stamp".into()];
        let g = graph(
            dir.path(),
            vec![phony_target("vendor", &[]), app, file_target(dir.path(), "vendor.stamp", &[])],
        );
        let p = run(&g, "app");
        assert_eq!(p.targets(), vec!["vendor"]);
        assert!(p.up_to_date.contains(&"app".to_string()));
    }

    #[test]
    fn test_kl004_phony_prerequisite_propagates() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "app", 100);
        let g = graph(
            dir.path(),
            vec![phony_target("gen", &[]), file_target(dir.path(), "app", &["gen"])],
        );
        assert_eq!(run(&g, "app").targets(), vec!["gen", "app"]);
    }

    #[test]
    fn test_kl004_cycle_fails_before_planning() {
        let dir = tempfile::tempdir().unwrap();
        let g = graph(
            dir.path(),
            vec![phony_target("a", &["b"]), phony_target("b", &["a"])],
        );
        let err = plan(&g, "a", &HostFs, PlanOptions::default()).unwrap_err();
        assert!(matches!(err, EngineError::CyclicDependency { .. }));
    }

    #[test]
    fn test_kl004_force() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "app", 100);
        let g = graph(dir.path(), vec![file_target(dir.path(), "app", &[])]);
        let opts = PlanOptions {
            force: true,
            ..PlanOptions::default()
        };
        let p = plan(&g, "app", &HostFs, opts).unwrap();
        assert_eq!(p.steps[0].reason, StaleReason::Forced);
    }

    #[test]
    fn test_kl004_command_change_tracked() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "app", 100);
        let mut app = file_target(dir.path(), "app", &[]);
        app.action = Action::Command(CommandAction {
            command: "go build -o app".into(),
            env: Default::default(),
            workdir: dir.path().to_path_buf(),
        });
        let g = graph(dir.path(), vec![app]);

        let mut lock = state::new_lock("test");
        lock.targets.insert(
            "app".into(),
            TargetRecord {
                status: TargetStatus::Built,
                built_at: None,
                duration_seconds: None,
                command_hash: "blake3:old".into(),
                artifact: Some("app".into()),
                artifact_hash: None,
            },
        );

        let untracked = PlanOptions {
            lock: Some(&lock),
            ..PlanOptions::default()
        };
        assert!(plan(&g, "app", &HostFs, untracked).unwrap().is_empty());

        let tracked = PlanOptions {
            track_commands: true,
            ..untracked
        };
        let p = plan(&g, "app", &HostFs, tracked).unwrap();
        assert_eq!(p.steps[0].reason, StaleReason::CommandChanged);
    }

    #[test]
    fn test_kl004_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "src.c", 100);
        touch(dir.path(), "obj.o", 200);
        let g = graph(
            dir.path(),
            vec![
                file_target(dir.path(), "obj.o", &["src.c"]),
                phony_target("check", &[]),
            ],
        );
        assert!(!is_stale(&g, "obj.o", &HostFs).unwrap());
        assert!(is_stale(&g, "check", &HostFs).unwrap());
        touch(dir.path(), "src.c", 300);
        assert!(is_stale(&g, "obj.o", &HostFs).unwrap());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_kl004_touch_invalidates_downstream(n in 2usize..7, k in 0usize..7) {
            let k = k % n;
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path();
            touch(root, "src", 1000);
            let mut targets = Vec::new();
            for i in 0..n {
                let name = format!("t{}", i);
                let prereq = if i == 0 { "src".to_string() } else { format!("t{}", i - 1) };
                touch(root, &name, 1001 + i as u64);
                targets.push(file_target(root, &name, &[prereq.as_str()]));
            }
            let g = graph(root, targets);
            let goal = format!("t{}", n - 1);
            prop_assert!(run(&g, &goal).is_empty());

            touch(root, &format!("t{}", k), 5000);
            let expected: Vec<String> = (k + 1..n).map(|i| format!("t{}", i)).collect();
            let p = run(&g, &goal);
            prop_assert_eq!(p.targets(), expected.iter().map(String::as_str).collect::<Vec<_>>());
        }
    }
}
