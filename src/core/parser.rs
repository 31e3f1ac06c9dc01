//! KL-002: YAML parsing and validation.
//!
//! Parses kiln.yaml and validates structural constraints:
//! - Version must be "1.0"
//! - Target names are unique across targets, matrices and recipes
//! - Phony targets have no path; a target has a command or a merge, not both
//! - Matrices have at least one os, arch and binary
//! - The default goal names a declared target

use super::graph::collect_declarations;
use super::types::*;
use std::collections::HashMap;
use std::path::Path;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a kiln.yaml file from disk.
pub fn parse_config_file(path: &Path) -> Result<KilnConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_config(&content)
}

/// Parse a kiln.yaml from a string.
pub fn parse_config(yaml: &str) -> Result<KilnConfig, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &KilnConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut err = |message: String| errors.push(ValidationError { message });

    if config.version != "1.0" {
        err(format!("version must be \"1.0\", got \"{}\"", config.version));
    }

    if config.name.is_empty() {
        err("name must not be empty".to_string());
    }

    if config.policy.shell.trim().is_empty() {
        err("policy.shell must not be empty".to_string());
    }

    for (goal, m) in &config.matrices {
        for (dim, values) in [("os", &m.os), ("arch", &m.arch), ("binaries", &m.binaries)] {
            if values.is_empty() {
                err(format!("matrix '{}' has no {}", goal, dim));
            }
        }
        if m.command.trim().is_empty() {
            err(format!("matrix '{}' has no command", goal));
        }
    }

    // Names never depend on the project root.
    let declared = collect_declarations(config, Path::new("."));
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for d in &declared {
        *seen.entry(d.name.as_str()).or_default() += 1;
    }
    let mut reported = Vec::new();
    for d in &declared {
        if seen[d.name.as_str()] > 1 && !reported.contains(&d.name.as_str()) {
            err(format!("target '{}' is declared more than once", d.name));
            reported.push(d.name.as_str());
        }
    }

    for d in &declared {
        let name = &d.name;
        let decl = &d.decl;
        if decl.phony && decl.path.is_some() {
            err(format!("target '{}' is phony but has a path", name));
        }
        if decl.phony && decl.merge.is_some() {
            err(format!("target '{}' is phony but merges into an artifact", name));
        }
        if decl.command.is_some() && decl.merge.is_some() {
            err(format!("target '{}' has both a command and a merge", name));
        }
        if let Some(cmd) = &decl.command {
            if cmd.trim().is_empty() {
                err(format!("target '{}' has an empty command", name));
            }
        }
        if decl.prerequisites.iter().chain(&decl.order_only).any(|p| p == name) {
            err(format!("target '{}' depends on itself", name));
        }
    }

    if let Some(goal) = &config.default {
        let known = declared
            .iter()
            .any(|d| &d.name == goal || d.decl.path.as_deref() == Some(goal.as_str()));
        if !known {
            err(format!("default goal '{}' is not a declared target", goal));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(yaml: &str) -> Vec<String> {
        let config = parse_config(yaml).unwrap();
        validate_config(&config)
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    #[test]
    fn test_kl002_parse_valid() {
        let yaml = r#"
version: "1.0"
name: svc
default: all
targets:
  all:
    phony: true
    prerequisites: [app]
  app:
    prerequisites: [main.go]
    command: go build -o {{artifact}}
"#;
        assert!(messages(yaml).is_empty());
    }

    #[test]
    fn test_kl002_parse_error() {
        let err = parse_config("version: [unclosed").unwrap_err();
        assert!(err.contains("YAML parse error"));
    }

    #[test]
    fn test_kl002_missing_file() {
        let err = parse_config_file(Path::new("/nonexistent/kiln.yaml")).unwrap_err();
        assert!(err.contains("failed to read"));
    }

    #[test]
    fn test_kl002_bad_version_and_name() {
        let errs = messages(
            r#"
version: "2.0"
name: ""
"#,
        );
        assert_eq!(errs.len(), 2);
        assert!(errs[0].contains("version"));
        assert!(errs[1].contains("name"));
    }

    #[test]
    fn test_kl002_phony_with_path_and_merge_with_command() {
        let errs = messages(
            r#"
version: "1.0"
name: svc
targets:
  test:
    phony: true
    path: out/test
    command: go test
  report:
    command: cat a b
    merge: concat
"#,
        );
        assert!(errs.iter().any(|e| e.contains("'test' is phony but has a path")));
        assert!(errs.iter().any(|e| e.contains("both a command and a merge")));
    }

    #[test]
    fn test_kl002_self_dependency() {
        let errs = messages(
            r#"
version: "1.0"
name: svc
targets:
  a:
    order_only: [a]
    command: touch a
"#,
        );
        assert_eq!(errs, vec!["target 'a' depends on itself"]);
    }

    #[test]
    fn test_kl002_duplicate_across_matrix() {
        let errs = messages(
            r#"
version: "1.0"
name: svc
targets:
  linux/amd64/app:
    command: touch x
matrices:
  build:
    os: [linux]
    arch: [amd64]
    binaries: [app]
    command: go build
"#,
        );
        assert_eq!(errs, vec!["target 'linux/amd64/app' is declared more than once"]);
    }

    #[test]
    fn test_kl002_duplicate_recipe_target() {
        let errs = messages(
            r#"
version: "1.0"
name: svc
targets:
  test:
    phony: true
    command: make test
recipes:
  - type: go
"#,
        );
        assert!(errs.contains(&"target 'test' is declared more than once".to_string()));
    }

    #[test]
    fn test_kl002_empty_matrix_dimension() {
        let errs = messages(
            r#"
version: "1.0"
name: svc
matrices:
  build:
    os: []
    arch: [amd64]
    binaries: [app]
    command: go build
"#,
        );
        assert!(errs.contains(&"matrix 'build' has no os".to_string()));
    }

    #[test]
    fn test_kl002_unknown_default() {
        let errs = messages(
            r#"
version: "1.0"
name: svc
default: release
targets:
  all: { phony: true }
"#,
        );
        assert_eq!(errs, vec!["default goal 'release' is not a declared target"]);
    }

    #[test]
    fn test_kl002_recipe_config_valid() {
        let yaml = r#"
version: "1.0"
name: svc
recipes:
  - type: go
    packages: [api]
    binaries: [svc]
"#;
        assert!(messages(yaml).is_empty());
    }
}
