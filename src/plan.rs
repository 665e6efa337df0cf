//! Plan file discovery and checkbox scanning.
//!
//! The plan is a markdown task list maintained by the agent tools; drover
//! only ever reads it, and only looks for the literal `- [ ]` marker when
//! deciding whether a completion claim can be trusted.

use anyhow::{Context, Result, anyhow};
use glob::glob;
use std::path::{Path, PathBuf};

/// Literal marker for an unchecked plan item.
const UNCHECKED: &str = "- [ ]";

/// Locate the plan file for a project.
///
/// Checks `PLAN.md` in the project directory first, then falls back to the
/// most recently modified `docs/plans/*plan*.md` match.
pub fn find_plan_file(project_dir: &Path) -> Result<PathBuf> {
    let plan = project_dir.join("PLAN.md");
    if plan.exists() {
        return Ok(plan);
    }

    let pattern = project_dir
        .join("docs/plans/*plan*.md")
        .to_string_lossy()
        .to_string();
    let mut plan_files: Vec<PathBuf> = glob(&pattern)
        .context("Failed to read glob pattern")?
        .filter_map(|entry| entry.ok())
        .collect();

    if plan_files.is_empty() {
        return Err(anyhow!(
            "No plan file found. Create PLAN.md or pass --plan <path>"
        ));
    }

    // Most recently modified first
    plan_files.sort_by(|a, b| {
        let a_time = a.metadata().and_then(|m| m.modified()).ok();
        let b_time = b.metadata().and_then(|m| m.modified()).ok();
        b_time.cmp(&a_time)
    });

    Ok(plan_files.remove(0))
}

/// Count lines still carrying an unchecked `- [ ]` marker.
pub fn count_unchecked(path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan file at {}", path.display()))?;
    Ok(content.lines().filter(|line| line.contains(UNCHECKED)).count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_count_unchecked_mixed_items() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("PLAN.md");
        fs::write(
            &path,
            "# Plan\n\n- [x] done task\n- [ ] open task\n  - [ ] nested open task\nnot a task\n",
        )
        .unwrap();
        assert_eq!(count_unchecked(&path).unwrap(), 2);
    }

    #[test]
    fn test_count_unchecked_all_complete() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("PLAN.md");
        fs::write(&path, "- [x] one\n- [x] two\n").unwrap();
        assert_eq!(count_unchecked(&path).unwrap(), 0);
    }

    #[test]
    fn test_count_unchecked_missing_file_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.md");
        assert!(count_unchecked(&path).is_err());
    }

    #[test]
    fn test_find_plan_prefers_root_plan_md() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("PLAN.md"), "- [ ] task\n").unwrap();
        fs::create_dir_all(dir.path().join("docs/plans")).unwrap();
        fs::write(dir.path().join("docs/plans/old-plan.md"), "x").unwrap();

        let found = find_plan_file(dir.path()).unwrap();
        assert_eq!(found, dir.path().join("PLAN.md"));
    }

    #[test]
    fn test_find_plan_falls_back_to_docs_plans() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("docs/plans")).unwrap();
        fs::write(dir.path().join("docs/plans/feature-plan.md"), "- [ ] t\n").unwrap();

        let found = find_plan_file(dir.path()).unwrap();
        assert!(found.ends_with("docs/plans/feature-plan.md"));
    }

    #[test]
    fn test_find_plan_errors_when_nothing_matches() {
        let dir = tempdir().unwrap();
        let err = find_plan_file(dir.path()).unwrap_err();
        assert!(err.to_string().contains("No plan file"));
    }
}
