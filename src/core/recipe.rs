//! KL-012: Built-in recipes for Go and PHP projects.
//!
//! A recipe is a named bundle of target declarations. Instantiating one in
//! kiln.yaml expands it into plain targets (and, for Go, a build matrix) that
//! go through the same template, glob, and validation path as hand-written
//! targets.

use super::matrix::matrix_targets;
use super::types::{DeclaredTarget, MatrixDecl, MergeFormat, TargetDecl};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A recipe instantiation, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecipeDecl {
    Go(GoRecipe),
    Php(PhpRecipe),
}

impl RecipeDecl {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Go(_) => "go",
            Self::Php(_) => "php",
        }
    }
}

/// Go project: glide vendoring, tests, per-package coverage, lint, release matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoRecipe {
    /// Package directories that get a coverage profile
    pub packages: Vec<String>,
    /// Binaries under `cmd/<name>` built for every platform
    pub binaries: Vec<String>,
    pub os: Vec<String>,
    pub arch: Vec<String>,
    pub output_dir: String,
    /// Install dependencies with glide into `vendor/`
    pub vendor: bool,
    /// Lint commands; their combined output is tee'd to `<output_dir>/lint.log`
    pub linters: Vec<String>,
}

impl Default for GoRecipe {
    fn default() -> Self {
        Self {
            packages: Vec::new(),
            binaries: Vec::new(),
            os: vec!["linux".into(), "darwin".into(), "windows".into()],
            arch: vec!["amd64".into()],
            output_dir: "build".into(),
            vendor: true,
            linters: vec!["go vet ./...".into()],
        }
    }
}

/// PHP project: composer install, tests, coverage through phpdbg.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhpRecipe {
    pub output_dir: String,
    /// Sources whose changes invalidate coverage reports
    pub sources: Vec<String>,
}

impl Default for PhpRecipe {
    fn default() -> Self {
        Self {
            output_dir: "build".into(),
            sources: vec!["src/**/*.php".into(), "tests/**/*.php".into()],
        }
    }
}

/// Test runner used by the PHP recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhpRunner {
    Peridot,
    PhpUnit,
}

impl PhpRunner {
    pub fn binary(&self) -> &'static str {
        match self {
            Self::Peridot => "vendor/bin/peridot",
            Self::PhpUnit => "vendor/bin/phpunit",
        }
    }

    fn html_coverage_args(&self, dir: &str) -> String {
        match self {
            Self::Peridot => format!(
                "--reporter html-code-coverage --code-coverage-path={}",
                dir
            ),
            Self::PhpUnit => format!("--coverage-html {}", dir),
        }
    }

    fn clover_coverage_args(&self, file: &str) -> String {
        match self {
            Self::Peridot => format!(
                "--reporter clover-code-coverage --code-coverage-path={}",
                file
            ),
            Self::PhpUnit => format!("--coverage-clover {}", file),
        }
    }
}

/// Peridot when the project has a `peridot.php`, phpunit otherwise.
pub fn select_php_runner(root: &Path) -> PhpRunner {
    if root.join("peridot.php").is_file() {
        PhpRunner::Peridot
    } else {
        PhpRunner::PhpUnit
    }
}

/// Expand a recipe into target declarations.
pub fn expand(recipe: &RecipeDecl, root: &Path) -> Vec<DeclaredTarget> {
    match recipe {
        RecipeDecl::Go(go) => expand_go(go),
        RecipeDecl::Php(php) => expand_php(php, select_php_runner(root)),
    }
}

fn phony(name: &str, prerequisites: &[&str], description: &str) -> DeclaredTarget {
    DeclaredTarget::new(
        name,
        TargetDecl {
            phony: true,
            prerequisites: prerequisites.iter().map(|s| s.to_string()).collect(),
            description: Some(description.to_string()),
            ..TargetDecl::default()
        },
    )
}

fn first_word(command: &str) -> Option<String> {
    command.split_whitespace().next().map(str::to_string)
}

fn expand_go(go: &GoRecipe) -> Vec<DeclaredTarget> {
    let out = go.output_dir.trim_end_matches('/');
    let vendor: Vec<String> = if go.vendor {
        vec!["vendor".to_string()]
    } else {
        vec![]
    };
    let mut targets = Vec::new();

    let mut all = vec!["test"];
    if !go.binaries.is_empty() {
        all.push("build");
    }
    targets.push(phony("all", &all, "Test and build"));

    if go.vendor {
        targets.push(DeclaredTarget::new(
            "vendor",
            TargetDecl {
                prerequisites: vec!["glide.yaml".into()],
                command: Some("glide install && touch vendor".into()),
                requires: vec!["glide".into()],
                description: Some("Install dependencies".into()),
                ..TargetDecl::default()
            },
        ));
    }

    targets.push(DeclaredTarget::new(
        "test",
        TargetDecl {
            phony: true,
            order_only: vendor.clone(),
            command: Some("go test ./...".into()),
            requires: vec!["go".into()],
            description: Some("Run tests".into()),
            ..TargetDecl::default()
        },
    ));

    let mut profiles = Vec::with_capacity(go.packages.len());
    for pkg in &go.packages {
        let pkg = pkg.trim_start_matches("./").trim_end_matches('/');
        let name = format!("{}/cover/{}/cover.out", out, pkg);
        targets.push(DeclaredTarget::new(
            &name,
            TargetDecl {
                prerequisites: vec![format!("{}/*.go", pkg)],
                order_only: vendor.clone(),
                command: Some(format!(
                    "go test -covermode=count -coverprofile={{{{artifact}}}} ./{} && {{ test -f {{{{artifact}}}} || : > {{{{artifact}}}}; }}",
                    pkg
                )),
                requires: vec!["go".into()],
                description: Some(format!("Coverage profile for {}", pkg)),
                ..TargetDecl::default()
            },
        ));
        profiles.push(name);
    }

    let merged = format!("{}/coverage.out", out);
    let html = format!("{}/coverage.html", out);
    targets.push(DeclaredTarget::new(
        &merged,
        TargetDecl {
            prerequisites: profiles,
            merge: Some(MergeFormat::GoCover),
            description: Some("Merged coverage profile".into()),
            ..TargetDecl::default()
        },
    ));
    targets.push(DeclaredTarget::new(
        &html,
        TargetDecl {
            prerequisites: vec![merged],
            command: Some("go tool cover -html={{inputs}} -o {{artifact}}".into()),
            requires: vec!["go".into()],
            description: Some("Coverage report".into()),
            ..TargetDecl::default()
        },
    ));
    targets.push(phony("coverage", &[html.as_str()], "Build the coverage report"));

    if !go.linters.is_empty() {
        targets.push(DeclaredTarget::new(
            "lint",
            TargetDecl {
                phony: true,
                order_only: vendor.clone(),
                command: Some(format!(
                    "mkdir -p {out} && ( {} ) 2>&1 | tee {out}/lint.log",
                    go.linters.join("; "),
                    out = out
                )),
                requires: go.linters.iter().filter_map(|l| first_word(l)).collect(),
                best_effort: true,
                description: Some("Run linters".into()),
                ..TargetDecl::default()
            },
        ));
    }

    if !go.binaries.is_empty() {
        let mut env = IndexMap::new();
        env.insert("GOOS".to_string(), "{{os}}".to_string());
        env.insert("GOARCH".to_string(), "{{arch}}".to_string());
        env.insert("CGO_ENABLED".to_string(), "0".to_string());
        let matrix = MatrixDecl {
            os: go.os.clone(),
            arch: go.arch.clone(),
            binaries: go.binaries.clone(),
            output_dir: Some(out.to_string()),
            windows_suffix: super::types::default_windows_suffix(),
            command: "go build -o {{artifact}} ./cmd/{{binary}}".into(),
            env,
            prerequisites: vec!["cmd/{{binary}}/*.go".into()],
            order_only: vendor,
            requires: vec!["go".into()],
        };
        targets.extend(matrix_targets("build", &matrix));
    }

    targets.push(DeclaredTarget::new(
        "clean",
        TargetDecl {
            phony: true,
            command: Some(format!("rm -rf {}", out)),
            description: Some("Remove build output".into()),
            ..TargetDecl::default()
        },
    ));
    targets
}

fn expand_php(php: &PhpRecipe, runner: PhpRunner) -> Vec<DeclaredTarget> {
    let out = php.output_dir.trim_end_matches('/');
    let html_dir = format!("{}/coverage", out);
    let html_index = format!("{}/index.html", html_dir);
    let clover = format!("{}/logs/clover.xml", out);
    let mut sources = php.sources.clone();
    sources.push("vendor".into());

    vec![
        phony("all", &["test"], "Run tests"),
        DeclaredTarget::new(
            "vendor",
            TargetDecl {
                path: Some("vendor/autoload.php".into()),
                prerequisites: vec!["composer.json".into()],
                command: Some("composer install".into()),
                requires: vec!["composer".into()],
                description: Some("Install dependencies".into()),
                ..TargetDecl::default()
            },
        ),
        DeclaredTarget::new(
            "test",
            TargetDecl {
                phony: true,
                prerequisites: vec!["vendor".into()],
                command: Some(runner.binary().to_string()),
                description: Some("Run tests".into()),
                ..TargetDecl::default()
            },
        ),
        DeclaredTarget::new(
            &html_index,
            TargetDecl {
                prerequisites: sources.clone(),
                command: Some(format!(
                    "phpdbg -qrr {} {}",
                    runner.binary(),
                    runner.html_coverage_args(&html_dir)
                )),
                requires: vec!["phpdbg".into()],
                description: Some("HTML coverage report".into()),
                ..TargetDecl::default()
            },
        ),
        phony("coverage", &[html_index.as_str()], "Build the HTML coverage report"),
        DeclaredTarget::new(
            &clover,
            TargetDecl {
                prerequisites: sources,
                command: Some(format!(
                    "phpdbg -qrr {} {}",
                    runner.binary(),
                    runner.clover_coverage_args("{{artifact}}")
                )),
                requires: vec!["phpdbg".into()],
                description: Some("Clover XML coverage report".into()),
                ..TargetDecl::default()
            },
        ),
        phony("coverage-clover", &[clover.as_str()], "Build the Clover coverage report"),
        DeclaredTarget::new(
            "clean",
            TargetDecl {
                phony: true,
                command: Some(format!("rm -rf {}", out)),
                description: Some("Remove build output".into()),
                ..TargetDecl::default()
            },
        ),
    ]
}
