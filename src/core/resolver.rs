//! KL-003: Template resolution and dependency ordering.
//!
//! Resolves `{{params.key}}` and per-target `{{var}}` templates. Orders a goal's
//! closure with a depth-first walk: prerequisites in declaration order, normal
//! before order-only, each target emitted after everything it needs. A back
//! edge aborts with the full cycle path.

use super::error::EngineError;
use super::graph::BuildGraph;
use super::types::yaml_value_to_string;
use crate::runner::FileSystem;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// Resolve all template variables in a string.
pub fn resolve_template(
    template: &str,
    params: &HashMap<String, serde_yaml_ng::Value>,
    vars: &IndexMap<String, String>,
) -> Result<String, String> {
    let mut result = template.to_string();
    let mut start = 0;

    while let Some(open) = result[start..].find("{{") {
        let open = start + open;
        let close = result[open..]
            .find("}}")
            .ok_or_else(|| format!("unclosed template at position {}", open))?;
        let close = open + close + 2;
        let key = result[open + 2..close - 2].trim();

        let value = if let Some(param_key) = key.strip_prefix("params.") {
            params
                .get(param_key)
                .map(yaml_value_to_string)
                .ok_or_else(|| format!("unknown param: {}", param_key))?
        } else {
            vars.get(key)
                .cloned()
                .ok_or_else(|| format!("unknown template variable: {}", key))?
        };

        result.replace_range(open..close, &value);
        start = open + value.len();
    }

    Ok(result)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

struct Walk<'a> {
    graph: &'a BuildGraph,
    fs: &'a dyn FileSystem,
    marks: HashMap<String, Mark>,
    stack: Vec<String>,
    order: Vec<String>,
    checked_sources: HashSet<String>,
}

impl Walk<'_> {
    fn visit(&mut self, name: &str) -> Result<(), EngineError> {
        match self.marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let pos = self.stack.iter().position(|n| n == name).unwrap_or(0);
                let mut cycle = self.stack[pos..].to_vec();
                cycle.push(name.to_string());
                return Err(EngineError::CyclicDependency { cycle });
            }
            None => {}
        }

        let graph = self.graph;
        let target = graph.get(name).ok_or_else(|| EngineError::UnknownTarget {
            name: name.to_string(),
            needed_by: self.stack.last().cloned(),
        })?;

        self.marks.insert(name.to_string(), Mark::Visiting);
        self.stack.push(name.to_string());

        for prereq in target.prerequisites.iter().chain(&target.order_only) {
            match graph.lookup(prereq) {
                Some(dep) => self.visit(&dep.name)?,
                None => self.check_source(prereq, name)?,
            }
        }

        self.stack.pop();
        self.marks.insert(name.to_string(), Mark::Done);
        self.order.push(name.to_string());
        Ok(())
    }

    /// A prerequisite with no rule must already exist on disk.
    fn check_source(&mut self, prereq: &str, needed_by: &str) -> Result<(), EngineError> {
        if self.checked_sources.contains(prereq) {
            return Ok(());
        }
        let path = self.graph.source_path(prereq);
        let exists = self
            .fs
            .stat(&path)
            .map_err(|e| EngineError::io(&path, e))?
            .is_some();
        if !exists {
            return Err(EngineError::UnknownTarget {
                name: prereq.to_string(),
                needed_by: Some(needed_by.to_string()),
            });
        }
        self.checked_sources.insert(prereq.to_string());
        Ok(())
    }
}

/// Topological order of every target `goal` needs, ending with the goal itself.
pub fn build_order(
    graph: &BuildGraph,
    goal: &str,
    fs: &dyn FileSystem,
) -> Result<Vec<String>, EngineError> {
    let target = graph.lookup(goal).ok_or_else(|| EngineError::UnknownTarget {
        name: goal.to_string(),
        needed_by: None,
    })?;

    let mut walk = Walk {
        graph,
        fs,
        marks: HashMap::new(),
        stack: Vec::new(),
        order: Vec::new(),
        checked_sources: HashSet::new(),
    };
    walk.visit(&target.name)?;

    tracing::debug!(goal = %target.name, targets = walk.order.len(), "resolved build order");
    Ok(walk.order)
}
