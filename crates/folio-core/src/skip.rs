//! Per-volume, per-step page overrides.
//!
//! A volume can list `skip_actions` entries that replace an action's normal
//! transform for specific pages. The driver picks at most one entry per action
//! instance and installs it on the worker context right before `run`.

use crate::actions::PageResult;
use crate::config::ConfigIssue;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipMode {
    Ignore,
    Copy,
    Move,
}

impl fmt::Display for SkipMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipMode::Ignore => "ignore",
            SkipMode::Copy => "copy",
            SkipMode::Move => "move",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipActionConfig {
    pub action: SkipMode,
    /// Action instance name, e.g. `optimize-1`.
    pub step: String,
    pub pages: BTreeSet<u32>,
}

impl SkipActionConfig {
    pub fn covers(&self, page: u32) -> bool {
        self.pages.contains(&page)
    }
}

/// The skip entry for `step`, if any. Pure: the same inputs give the same entry.
pub fn resolve_skip<'a>(skips: &'a [SkipActionConfig], step: &str) -> Option<&'a SkipActionConfig> {
    skips.iter().find(|s| s.step == step)
}

/// Validate a volume's skip entries against the realized action instances.
///
/// `steps` maps instance name to whether that action is page-scoped.
pub fn check_skip_actions(
    skips: &[SkipActionConfig],
    steps: &BTreeMap<String, bool>,
    prefix: &str,
) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();
    let mut seen = BTreeSet::new();

    for (i, skip) in skips.iter().enumerate() {
        let field = format!("{prefix}[{i}]");
        match steps.get(&skip.step) {
            None => {
                let valid: Vec<&str> = steps.keys().map(String::as_str).collect();
                issues.push(ConfigIssue::error(
                    format!("{field}.step"),
                    format!(
                        "unknown step '{}' (valid steps: {})",
                        skip.step,
                        valid.join(", ")
                    ),
                ));
            }
            Some(false) => issues.push(ConfigIssue::warning(
                format!("{field}.step"),
                format!("step '{}' is not page-scoped; the skip has no effect", skip.step),
            )),
            Some(true) => {}
        }
        if !seen.insert(skip.step.as_str()) {
            issues.push(ConfigIssue::error(
                format!("{field}.step"),
                format!("step '{}' has more than one skip entry", skip.step),
            ));
        }
        if skip.pages.is_empty() {
            issues.push(ConfigIssue::error(
                format!("{field}.pages"),
                "pages must not be empty".to_string(),
            ));
        }
    }

    issues
}

/// Carry out `mode` for `src`, targeting `out_dir/<file name>`.
pub fn apply(mode: SkipMode, src: &Path, out_dir: &Path) -> Result<PageResult> {
    let Some(name) = src.file_name() else {
        return Ok(PageResult::Ignored);
    };
    let dest = out_dir.join(name);
    match mode {
        SkipMode::Ignore => Ok(PageResult::Ignored),
        SkipMode::Copy => {
            if crate::io::copy_if_missing(src, &dest)? {
                Ok(PageResult::Copied)
            } else {
                tracing::warn!(dest = %dest.display(), "destination exists, skipping copy");
                Ok(PageResult::AlreadyDone)
            }
        }
        SkipMode::Move => {
            if src != dest {
                crate::io::move_file(src, &dest)?;
            }
            Ok(PageResult::Moved)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn skip(mode: SkipMode, step: &str, pages: &[u32]) -> SkipActionConfig {
        SkipActionConfig {
            action: mode,
            step: step.to_string(),
            pages: pages.iter().copied().collect(),
        }
    }

    fn steps() -> BTreeMap<String, bool> {
        [
            ("rename-1".to_string(), false),
            ("autolevel-1".to_string(), true),
            ("autolevel-2".to_string(), true),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn resolve_is_stable() {
        let skips = vec![
            skip(SkipMode::Copy, "autolevel-1", &[1]),
            skip(SkipMode::Ignore, "autolevel-2", &[4, 5]),
        ];
        let a = resolve_skip(&skips, "autolevel-2").cloned();
        let b = resolve_skip(&skips, "autolevel-2").cloned();
        assert_eq!(a, b);
        assert_eq!(a.unwrap().action, SkipMode::Ignore);
        assert!(resolve_skip(&skips, "pack-1").is_none());
    }

    #[test]
    fn unknown_step_is_an_error() {
        let issues = check_skip_actions(
            &[skip(SkipMode::Copy, "autolevel-9", &[1])],
            &steps(),
            "volumes[0].skip_actions",
        );
        assert_eq!(issues.len(), 1);
        assert!(issues[0].is_error());
        assert_eq!(issues[0].field, "volumes[0].skip_actions[0].step");
        assert!(issues[0].message.contains("autolevel-9"));
    }

    #[test]
    fn non_page_step_warns_and_duplicates_error() {
        let issues = check_skip_actions(
            &[
                skip(SkipMode::Copy, "rename-1", &[1]),
                skip(SkipMode::Copy, "autolevel-1", &[1]),
                skip(SkipMode::Move, "autolevel-1", &[2]),
            ],
            &steps(),
            "s",
        );
        assert_eq!(issues.iter().filter(|i| !i.is_error()).count(), 1);
        assert_eq!(issues.iter().filter(|i| i.is_error()).count(), 1);
    }

    #[test]
    fn copy_is_noop_when_destination_exists() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("p001.png");
        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(&src, b"new").unwrap();
        std::fs::write(out.join("p001.png"), b"old").unwrap();

        let result = apply(SkipMode::Copy, &src, &out).unwrap();
        assert_eq!(result, PageResult::AlreadyDone);
        assert_eq!(std::fs::read(out.join("p001.png")).unwrap(), b"old");
    }

    #[test]
    fn move_relocates_the_source() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("p002.png");
        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(&src, b"x").unwrap();

        assert_eq!(apply(SkipMode::Move, &src, &out).unwrap(), PageResult::Moved);
        assert!(!src.exists());
        assert!(out.join("p002.png").exists());
    }

    #[test]
    fn ignore_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("p003.png");
        std::fs::write(&src, b"x").unwrap();
        let out = dir.path().join("out");
        assert_eq!(apply(SkipMode::Ignore, &src, &out).unwrap(), PageResult::Ignored);
        assert!(src.exists());
        assert!(!out.exists());
    }
}
