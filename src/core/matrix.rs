//! KL-008: Matrix expansion, one target per (os, arch, binary).
//!
//! Entries are named `os/arch/file` where `file` is the binary name plus the
//! windows suffix when the OS is windows. Dimensions are deduplicated keeping
//! the first occurrence; order is os-major, then arch, then binary.

use super::types::{default_windows_suffix, DeclaredTarget, MatrixDecl, TargetDecl};
use indexmap::IndexMap;

/// One cell of the matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixEntry {
    pub os: String,
    pub arch: String,
    pub binary: String,
    /// Binary name with any platform suffix
    pub file_name: String,
}

impl MatrixEntry {
    pub fn target_name(&self) -> String {
        format!("{}/{}/{}", self.os, self.arch, self.file_name)
    }
}

pub fn is_windows(os: &str) -> bool {
    os.eq_ignore_ascii_case("windows")
}

/// Cross product with the default `.exe` suffix for windows.
pub fn expand_matrix(
    os_list: &[String],
    arch_list: &[String],
    binary_names: &[String],
) -> Vec<MatrixEntry> {
    expand_matrix_with_suffix(os_list, arch_list, binary_names, &default_windows_suffix())
}

pub fn expand_matrix_with_suffix(
    os_list: &[String],
    arch_list: &[String],
    binary_names: &[String],
    windows_suffix: &str,
) -> Vec<MatrixEntry> {
    let os_list = dedup(os_list);
    let arch_list = dedup(arch_list);
    let binary_names = dedup(binary_names);

    let mut entries = Vec::with_capacity(os_list.len() * arch_list.len() * binary_names.len());
    for os in &os_list {
        for arch in &arch_list {
            for binary in &binary_names {
                let file_name = if is_windows(os) && !binary.ends_with(windows_suffix) {
                    format!("{}{}", binary, windows_suffix)
                } else {
                    binary.to_string()
                };
                entries.push(MatrixEntry {
                    os: os.to_string(),
                    arch: arch.to_string(),
                    binary: binary.to_string(),
                    file_name,
                });
            }
        }
    }
    entries
}

fn dedup(items: &[String]) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item.as_str()) {
            out.push(item);
        }
    }
    out
}

/// Declarations for a matrix: one per entry, then a phony `goal` needing all of them.
pub fn matrix_targets(goal: &str, decl: &MatrixDecl) -> Vec<DeclaredTarget> {
    let entries =
        expand_matrix_with_suffix(&decl.os, &decl.arch, &decl.binaries, &decl.windows_suffix);
    let mut out = Vec::with_capacity(entries.len() + 1);

    for entry in &entries {
        let name = entry.target_name();
        let path = decl
            .output_dir
            .as_deref()
            .map(|dir| format!("{}/{}", dir.trim_end_matches('/'), name));

        let mut vars = IndexMap::new();
        vars.insert("os".to_string(), entry.os.clone());
        vars.insert("arch".to_string(), entry.arch.clone());
        vars.insert("binary".to_string(), entry.binary.clone());

        out.push(DeclaredTarget {
            name,
            decl: TargetDecl {
                path,
                prerequisites: decl.prerequisites.clone(),
                order_only: decl.order_only.clone(),
                command: Some(decl.command.clone()),
                env: decl.env.clone(),
                requires: decl.requires.clone(),
                description: Some(format!("{} for {}/{}", entry.binary, entry.os, entry.arch)),
                ..TargetDecl::default()
            },
            vars,
        });
    }

    out.push(DeclaredTarget::new(
        goal,
        TargetDecl {
            phony: true,
            prerequisites: entries.iter().map(MatrixEntry::target_name).collect(),
            description: Some(format!("{} platform builds", entries.len())),
            ..TargetDecl::default()
        },
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_kl008_linux_windows_amd64() {
        let entries = expand_matrix(
            &strings(&["linux", "windows"]),
            &strings(&["amd64"]),
            &strings(&["app"]),
        );
        let names: Vec<String> = entries.iter().map(MatrixEntry::target_name).collect();
        assert_eq!(names, vec!["linux/amd64/app", "windows/amd64/app.exe"]);
        assert_eq!(entries[1].binary, "app");
        assert_eq!(entries[1].file_name, "app.exe");
    }

    #[test]
    fn test_kl008_order_os_major() {
        let entries = expand_matrix(
            &strings(&["linux", "darwin"]),
            &strings(&["amd64", "arm64"]),
            &strings(&["a", "b"]),
        );
        let names: Vec<String> = entries.iter().map(MatrixEntry::target_name).collect();
        assert_eq!(
            names,
            vec![
                "linux/amd64/a",
                "linux/amd64/b",
                "linux/arm64/a",
                "linux/arm64/b",
                "darwin/amd64/a",
                "darwin/amd64/b",
                "darwin/arm64/a",
                "darwin/arm64/b",
            ]
        );
    }

    #[test]
    fn test_kl008_custom_suffix_and_case() {
        let entries = expand_matrix_with_suffix(
            &strings(&["Windows"]),
            &strings(&["386"]),
            &strings(&["tool"]),
            ".EXE",
        );
        assert_eq!(entries[0].target_name(), "Windows/386/tool.EXE");
    }

    #[test]
    fn test_kl008_suffix_not_doubled() {
        let entries = expand_matrix(
            &strings(&["windows"]),
            &strings(&["amd64"]),
            &strings(&["app.exe"]),
        );
        assert_eq!(entries[0].file_name, "app.exe");
    }

    #[test]
    fn test_kl008_empty_dimension() {
        assert!(expand_matrix(&[], &strings(&["amd64"]), &strings(&["app"])).is_empty());
    }

    #[test]
    fn test_kl008_matrix_targets() {
        let decl: MatrixDecl = serde_yaml_ng::from_str(
            r#"
os: [linux, windows]
arch: [amd64]
binaries: [app]
output_dir: build/
command: go build -o {{artifact}}
order_only: [vendor]
"#,
        )
        .unwrap();
        let targets = matrix_targets("build", &decl);
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[0].name, "linux/amd64/app");
        assert_eq!(targets[0].decl.path.as_deref(), Some("build/linux/amd64/app"));
        assert_eq!(targets[0].decl.order_only, vec!["vendor"]);
        assert_eq!(targets[1].vars["os"], "windows");
        assert_eq!(targets[1].vars["binary"], "app");

        let goal = &targets[2];
        assert_eq!(goal.name, "build");
        assert!(goal.decl.phony);
        assert_eq!(
            goal.decl.prerequisites,
            vec!["linux/amd64/app", "windows/amd64/app.exe"]
        );
    }

    proptest! {
        #[test]
        fn prop_kl008_cardinality_and_suffix(
            os in proptest::collection::vec("(linux|darwin|windows|freebsd)", 1..5),
            arch in proptest::collection::vec("(amd64|arm64|386)", 1..4),
            bins in proptest::collection::vec("[a-z]{1,6}", 1..4),
        ) {
            let entries = expand_matrix(&os, &arch, &bins);
            let expected = dedup(&os).len() * dedup(&arch).len() * dedup(&bins).len();
            prop_assert_eq!(entries.len(), expected);
            for e in &entries {
                prop_assert_eq!(e.file_name.ends_with(".exe"), e.os == "windows");
            }
            let mut names: Vec<String> = entries.iter().map(MatrixEntry::target_name).collect();
            names.sort();
            names.dedup();
            prop_assert_eq!(names.len(), expected);
        }
    }
}
