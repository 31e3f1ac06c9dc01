//! KL-006: Build graph construction.
//!
//! Turns a parsed [`KilnConfig`] into a [`BuildGraph`]: recipes and matrices are
//! expanded into plain target declarations, templates are resolved, wildcard
//! prerequisites are globbed against declared artifacts and the filesystem, and
//! every declaration becomes a [`Target`]. Prerequisite names are kept as
//! written; they are looked up (by target name, then by artifact path) when the
//! graph is resolved.

use super::error::EngineError;
use super::matrix;
use super::recipe;
use super::resolver::resolve_template;
use super::types::*;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

/// A static set of targets rooted at a project directory.
#[derive(Debug, Clone)]
pub struct BuildGraph {
    pub name: String,
    pub root: PathBuf,
    default_goal: Option<String>,
    targets: IndexMap<String, Target>,
    by_path: HashMap<PathBuf, String>,
}

impl BuildGraph {
    pub fn new(name: &str, root: &Path) -> Self {
        Self {
            name: name.to_string(),
            root: normalize_path(root),
            default_goal: None,
            targets: IndexMap::new(),
            by_path: HashMap::new(),
        }
    }

    /// Add a target. Names and artifact paths must be unique.
    pub fn insert(&mut self, target: Target) -> Result<(), EngineError> {
        if self.targets.contains_key(&target.name) {
            return Err(EngineError::Config(format!(
                "target '{}' is declared more than once",
                target.name
            )));
        }
        if let Some(path) = target.artifact() {
            let path = normalize_path(path);
            if let Some(owner) = self.by_path.get(&path) {
                return Err(EngineError::Config(format!(
                    "targets '{}' and '{}' both produce {}",
                    owner,
                    target.name,
                    path.display()
                )));
            }
            self.by_path.insert(path, target.name.clone());
        }
        self.targets.insert(target.name.clone(), target);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }

    /// Find a target by name, or by the artifact it produces.
    pub fn lookup(&self, name_or_path: &str) -> Option<&Target> {
        if let Some(t) = self.targets.get(name_or_path) {
            return Some(t);
        }
        let path = normalize_path(&self.root.join(name_or_path));
        self.by_path.get(&path).and_then(|n| self.targets.get(n))
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// The configured default goal, else the first declared target.
    pub fn default_goal(&self) -> Option<&str> {
        self.default_goal
            .as_deref()
            .or_else(|| self.targets.keys().next().map(String::as_str))
    }

    pub fn set_default_goal(&mut self, goal: Option<String>) {
        self.default_goal = goal;
    }

    /// Absolute path of a prerequisite that has no rule.
    pub fn source_path(&self, prereq: &str) -> PathBuf {
        normalize_path(&self.root.join(prereq))
    }

    /// Path of a prerequisite as a file: the artifact for file targets, the
    /// source path otherwise. Phony prerequisites have none.
    pub fn prerequisite_path(&self, prereq: &str) -> Option<PathBuf> {
        match self.lookup(prereq) {
            Some(t) => t.artifact().map(Path::to_path_buf),
            None => Some(self.source_path(prereq)),
        }
    }

    /// Files a merge target combines: its normal prerequisites, in order.
    pub fn merge_inputs(&self, target: &Target) -> Vec<PathBuf> {
        target
            .prerequisites
            .iter()
            .filter_map(|p| self.prerequisite_path(p))
            .collect()
    }

    /// Path relative to the project root, for display and the lock file.
    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }

    /// Build the graph for a config rooted at `root`.
    pub fn from_config(config: &KilnConfig, root: &Path) -> Result<Self, EngineError> {
        let declared = collect_declarations(config, root);
        let mut graph = BuildGraph::new(&config.name, root);
        graph.set_default_goal(config.default.clone());

        // Artifact paths first: globs and {{inputs}} need every declared path.
        let mut resolved = Vec::with_capacity(declared.len());
        let mut declared_paths: Vec<(String, String)> = Vec::new();
        let mut phony: HashSet<String> = HashSet::new();
        for d in declared {
            if d.decl.phony {
                phony.insert(d.name.clone());
            }
            let mut vars = d.vars.clone();
            vars.insert("target".to_string(), d.name.clone());
            let path = match (&d.decl.path, d.decl.phony) {
                (_, true) => None,
                (Some(p), false) => Some(template(p, config, &vars, &d.name)?),
                (None, false) => Some(d.name.clone()),
            };
            if let Some(ref p) = path {
                vars.insert("artifact".to_string(), p.clone());
                declared_paths.push((d.name.clone(), p.clone()));
            }
            resolved.push((d, vars, path));
        }

        for (d, mut vars, path) in resolved {
            let prerequisites =
                expand_prerequisites(&d.decl.prerequisites, config, &vars, &d.name, root, &declared_paths)?;
            let order_only =
                expand_prerequisites(&d.decl.order_only, config, &vars, &d.name, root, &declared_paths)?;

            let inputs: Vec<String> = prerequisites
                .iter()
                .filter_map(|p| input_path(p, &declared_paths, &phony))
                .collect();
            vars.insert("inputs".to_string(), inputs.join(" "));

            let action = match (&d.decl.command, d.decl.merge) {
                (Some(_), Some(_)) => {
                    return Err(EngineError::Config(format!(
                        "target '{}' has both a command and a merge",
                        d.name
                    )))
                }
                (Some(cmd), None) => {
                    let mut env = IndexMap::new();
                    for (k, v) in config.env.iter().chain(&d.decl.env) {
                        env.insert(k.clone(), template(v, config, &vars, &d.name)?);
                    }
                    let workdir = match &d.decl.workdir {
                        Some(w) => normalize_path(&root.join(template(w, config, &vars, &d.name)?)),
                        None => normalize_path(root),
                    };
                    Action::Command(CommandAction {
                        command: template(cmd, config, &vars, &d.name)?,
                        env,
                        workdir,
                    })
                }
                (None, Some(format)) => Action::Merge(format),
                (None, None) => Action::Nothing,
            };

            let kind = match path {
                Some(p) => TargetKind::File {
                    path: normalize_path(&root.join(p)),
                },
                None => TargetKind::Phony,
            };

            graph.insert(Target {
                name: d.name,
                kind,
                prerequisites,
                order_only,
                action,
                requires: d.decl.requires,
                best_effort: d.decl.best_effort,
                description: d.decl.description,
            })?;
        }

        tracing::debug!(project = %graph.name, targets = graph.len(), "built graph");
        Ok(graph)
    }
}

/// Every target declaration in a config: explicit targets, then matrices, then recipes.
pub fn collect_declarations(config: &KilnConfig, root: &Path) -> Vec<DeclaredTarget> {
    let mut out: Vec<DeclaredTarget> = config
        .targets
        .iter()
        .map(|(name, decl)| DeclaredTarget::new(name, decl.clone()))
        .collect();
    for (goal, decl) in &config.matrices {
        out.extend(matrix::matrix_targets(goal, decl));
    }
    for r in &config.recipes {
        out.extend(recipe::expand(r, root));
    }
    out
}

fn template(
    text: &str,
    config: &KilnConfig,
    vars: &IndexMap<String, String>,
    target: &str,
) -> Result<String, EngineError> {
    resolve_template(text, &config.params, vars)
        .map_err(|e| EngineError::Config(format!("target '{}': {}", target, e)))
}

fn is_glob(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Resolve templates and expand wildcards. Matches are sorted and deduplicated;
/// declared artifacts match by path even before they exist.
fn expand_prerequisites(
    raw: &[String],
    config: &KilnConfig,
    vars: &IndexMap<String, String>,
    target: &str,
    root: &Path,
    declared_paths: &[(String, String)],
) -> Result<Vec<String>, EngineError> {
    let mut out: Vec<String> = Vec::new();
    for r in raw {
        let p = template(r, config, vars, target)?;
        if !is_glob(&p) {
            if !out.contains(&p) {
                out.push(p);
            }
            continue;
        }

        let pattern = glob::Pattern::new(&p)
            .map_err(|e| EngineError::Config(format!("target '{}': bad pattern {}: {}", target, p, e)))?;
        let options = glob::MatchOptions {
            require_literal_separator: true,
            ..Default::default()
        };
        let mut matches: Vec<String> = declared_paths
            .iter()
            .filter(|(_, path)| pattern.matches_with(path, options))
            .map(|(name, _)| name.clone())
            .collect();

        let escaped_root = glob::Pattern::escape(&root.to_string_lossy());
        let full = Path::new(&escaped_root).join(&p);
        let entries = glob::glob(&full.to_string_lossy())
            .map_err(|e| EngineError::Config(format!("target '{}': bad pattern {}: {}", target, p, e)))?;
        for entry in entries.flatten() {
            let rel = entry
                .strip_prefix(root)
                .unwrap_or(&entry)
                .to_string_lossy()
                .to_string();
            let name = declared_paths
                .iter()
                .find(|(_, path)| *path == rel)
                .map(|(name, _)| name.clone())
                .unwrap_or(rel);
            matches.push(name);
        }

        matches.sort();
        matches.dedup();
        for m in matches {
            if m != target && !out.contains(&m) {
                out.push(m);
            }
        }
    }
    Ok(out)
}

/// Relative file path a prerequisite contributes to `{{inputs}}`.
fn input_path(
    prereq: &str,
    declared_paths: &[(String, String)],
    phony: &HashSet<String>,
) -> Option<String> {
    if phony.contains(prereq) {
        return None;
    }
    match declared_paths.iter().find(|(name, _)| name == prereq) {
        Some((_, path)) => Some(path.clone()),
        None => Some(prereq.to_string()),
    }
}

/// Lexically normalize a path: drop `.` components and fold `..`.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
