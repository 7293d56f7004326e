//! Search planning and pattern expansion.
//!
//! # Data Flow
//! ```text
//! ScanConfig { paths, pattern }
//!     → plan(): resolve each path against the root, in order
//!         missing dir  → SearchStep::MissingDir
//!         existing dir → one SearchStep::Search per pattern
//!     → expand(): walk the dir, match paths relative to it
//! ```
//!
//! # Design Decisions
//! - Order is deterministic: config order for dirs and patterns, file name
//!   order within a walk
//! - A file matched by two patterns is visited twice

use std::path::{Path, PathBuf};

use globset::GlobBuilder;
use walkdir::WalkDir;

use crate::config::ScanConfig;

/// One directory searched with one pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTask {
    pub dir: PathBuf,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStep {
    MissingDir(PathBuf),
    Search(SearchTask),
}

/// Ordered work for one scan.
#[derive(Debug, Clone, Default)]
pub struct SearchPlan {
    /// Every configured directory, resolved against the root.
    pub dirs: Vec<PathBuf>,
    pub steps: Vec<SearchStep>,
}

fn resolve_dir(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Build the search plan for `config` relative to `root`.
pub fn plan(config: &ScanConfig, root: &Path) -> SearchPlan {
    let dirs: Vec<PathBuf> = config.paths.iter().map(|p| resolve_dir(root, p)).collect();

    let mut steps = Vec::new();
    for dir in &dirs {
        if !dir.is_dir() {
            steps.push(SearchStep::MissingDir(dir.clone()));
            continue;
        }
        for pattern in config.pattern.as_slice() {
            steps.push(SearchStep::Search(SearchTask {
                dir: dir.clone(),
                pattern: pattern.clone(),
            }));
        }
    }

    SearchPlan { dirs, steps }
}

/// Files under `task.dir` whose relative path matches `task.pattern`.
pub fn expand(task: &SearchTask) -> Result<Vec<PathBuf>, globset::Error> {
    let matcher = GlobBuilder::new(&task.pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher();

    let mut files = Vec::new();
    for entry in WalkDir::new(&task.dir).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(dir = %task.dir.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(&task.dir) else {
            continue;
        };
        if matcher.is_match(relative) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "[]").unwrap();
    }

    #[test]
    fn test_plan_resolves_relative_paths_and_flags_missing() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("server")).unwrap();

        let config = ScanConfig::new(["server", "missing"]).with_pattern(vec!["*.a".to_string(), "*.b".to_string()]);
        let plan = plan(&config, root.path());

        assert_eq!(plan.dirs, vec![root.path().join("server"), root.path().join("missing")]);
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(
            plan.steps[2],
            SearchStep::MissingDir(root.path().join("missing"))
        );
    }

    #[test]
    fn test_default_pattern_matches_nested_router_files() {
        let root = TempDir::new().unwrap();
        touch(root.path(), "users.router.rhai");
        touch(root.path(), "admin/roles.router.rhai");
        touch(root.path(), "helpers.rhai");

        let files = expand(&SearchTask {
            dir: root.path().to_path_buf(),
            pattern: crate::config::DEFAULT_PATTERN.to_string(),
        })
        .unwrap();

        let names: Vec<String> = files
            .iter()
            .map(|f| f.strip_prefix(root.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["admin/roles.router.rhai", "users.router.rhai"]);
    }

    #[test]
    fn test_single_star_does_not_cross_directories() {
        let root = TempDir::new().unwrap();
        touch(root.path(), "top.rhai");
        touch(root.path(), "nested/deep.rhai");

        let files = expand(&SearchTask {
            dir: root.path().to_path_buf(),
            pattern: "*.rhai".to_string(),
        })
        .unwrap();
        assert_eq!(files, vec![root.path().join("top.rhai")]);
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let root = TempDir::new().unwrap();
        assert!(expand(&SearchTask {
            dir: root.path().to_path_buf(),
            pattern: "[unclosed".to_string(),
        })
        .is_err());
    }
}
