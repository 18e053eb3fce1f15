//! Runs the action pipeline over every selected volume.
//!
//! Volumes run one after another. Each gets a fresh [`WorkerContext`] rooted at
//! `root/base_path/volume.path`; actions run in config order and a failure ends
//! only the volume it happened in.
//!
//! Transitions per volume: `NotStarted → Running → Completed | Failed | Halted`

use crate::actions::{ActionReport, ActionStep, HaltScope};
use crate::config::{ConfigIssue, OrchestratorConfig, VolumeConfig};
use crate::context::{CancelFlag, RuleContext, WorkerContext};
use crate::effects::{Effects, ToolEffects};
use crate::error::{FolioError, Result};
use crate::skip::resolve_skip;
use crate::tools::{preflight, ToolRequirements, ToolResolver, ToolSet};
use crate::types::Number;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub dry_run: bool,
    /// Restrict the run to these volume numbers. Empty means all.
    pub volumes: Vec<Number>,
    pub cancel: CancelFlag,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            volumes: Vec::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VolumeStatus {
    NotStarted,
    Running { index: usize },
    Completed,
    /// `action` is `None` when the volume failed before its first action.
    Failed {
        action: Option<String>,
        error: String,
    },
    /// An interrupt action stopped the volume.
    Halted { action: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRecord {
    pub name: String,
    /// The action's condition was false for this volume.
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ActionReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeSummary {
    pub number: Number,
    pub path: PathBuf,
    pub status: VolumeStatus,
    pub actions: Vec<ActionRecord>,
}

impl VolumeSummary {
    fn new(volume: &VolumeConfig) -> Self {
        Self {
            number: volume.number,
            path: volume.path.clone(),
            status: VolumeStatus::NotStarted,
            actions: Vec::new(),
        }
    }

    pub fn skipped(&self) -> usize {
        self.actions.iter().filter(|a| a.skipped).count()
    }

    /// Sum of every action's report.
    pub fn totals(&self) -> ActionReport {
        let mut total = ActionReport::default();
        for r in self.actions.iter().filter_map(|a| a.report.as_ref()) {
            total.processed += r.processed;
            total.copied += r.copied;
            total.moved += r.moved;
            total.ignored += r.ignored;
            total.already_done += r.already_done;
            total.failed += r.failed;
            total.renamed += r.renamed;
        }
        total
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub dry_run: bool,
    pub cancelled: bool,
    pub volumes: Vec<VolumeSummary>,
}

impl RunSummary {
    /// No volume failed, no page failed, and the run was not cancelled.
    pub fn success(&self) -> bool {
        !self.cancelled
            && self.volumes.iter().all(|v| {
                !matches!(v.status, VolumeStatus::Failed { .. }) && v.totals().failed == 0
            })
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub struct Driver {
    config: OrchestratorConfig,
    root: PathBuf,
    effects: Arc<dyn Effects>,
}

impl Driver {
    /// `root` is the directory every relative path in `config` resolves against.
    pub fn new(config: OrchestratorConfig, root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            root: root.into(),
            effects: Arc::new(ToolEffects),
        }
    }

    /// Load and validate `path`; its parent directory becomes the root.
    pub fn from_path(path: &Path) -> Result<Self> {
        let config = OrchestratorConfig::load(path)?;
        Ok(Self::new(config, config_root(path)))
    }

    pub fn with_effects(mut self, effects: Arc<dyn Effects>) -> Self {
        self.effects = effects;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn selected(&self, filter: &[Number]) -> Result<Vec<&VolumeConfig>> {
        if filter.is_empty() {
            return Ok(self.config.volumes.iter().collect());
        }
        let unknown: Vec<ConfigIssue> = filter
            .iter()
            .filter(|n| self.config.volume(**n).is_none())
            .map(|n| ConfigIssue::error("volumes", format!("no volume numbered {n}")))
            .collect();
        if !unknown.is_empty() {
            return Err(FolioError::InvalidConfig(unknown));
        }
        Ok(self
            .config
            .volumes
            .iter()
            .filter(|v| filter.contains(&v.number))
            .collect())
    }

    /// Tools needed by every action whose condition holds for at least one of `volumes`.
    fn requirements(&self, volumes: &[&VolumeConfig], dry_run: bool) -> Vec<(String, ToolRequirements)> {
        self.config
            .named_actions()
            .into_iter()
            .filter(|(_, step)| {
                volumes
                    .iter()
                    .any(|v| applies(step, &RuleContext::new(&self.config, v, dry_run)))
            })
            .map(|(name, step)| (name, step.action.required_tools()))
            .filter(|(_, tools)| !tools.is_empty())
            .collect()
    }

    /// Resolve every required tool up front, reporting all missing ones together.
    ///
    /// In a dry run missing tools are only logged.
    pub fn preflight<R: ToolResolver + ?Sized>(&self, resolver: &R, opts: &RunOptions) -> Result<ToolSet> {
        let volumes = self.selected(&opts.volumes)?;
        let (tools, missing) = preflight(&self.requirements(&volumes, opts.dry_run), resolver);
        for (name, path) in tools.binaries() {
            tracing::debug!(tool = name, path = %path.display(), "tool ready");
        }
        if missing.is_empty() {
            return Ok(tools);
        }
        if opts.dry_run {
            for m in &missing {
                tracing::warn!(
                    tool = %m.name,
                    kind = %m.kind,
                    needed_by = %m.needed_by.join(", "),
                    "tool not found"
                );
            }
            return Ok(tools);
        }
        Err(FolioError::ToolsUnavailable(missing))
    }

    pub fn run<R: ToolResolver + ?Sized>(&self, resolver: &R, opts: &RunOptions) -> Result<RunSummary> {
        let tools = Arc::new(self.preflight(resolver, opts)?);
        let volumes = self.selected(&opts.volumes)?;

        let mut summary = RunSummary {
            dry_run: opts.dry_run,
            cancelled: false,
            volumes: volumes.iter().map(|v| VolumeSummary::new(v)).collect(),
        };

        for (volume, entry) in volumes.iter().zip(summary.volumes.iter_mut()) {
            if opts.cancel.load(Ordering::Relaxed) {
                summary.cancelled = true;
                break;
            }
            tracing::info!(volume = %volume.number, path = %volume.path.display(), "volume: starting");
            let halt = self.run_volume(volume, &tools, opts, entry);
            match &entry.status {
                VolumeStatus::Failed { action, error } => tracing::error!(
                    volume = %volume.number,
                    action = action.as_deref().unwrap_or("-"),
                    "volume failed: {error}"
                ),
                status => tracing::info!(volume = %volume.number, ?status, "volume: done"),
            }
            if opts.cancel.load(Ordering::Relaxed) {
                summary.cancelled = true;
                break;
            }
            if halt == Some(HaltScope::Run) {
                tracing::warn!("interrupt: remaining volumes will not start");
                break;
            }
        }
        Ok(summary)
    }

    fn run_volume(
        &self,
        volume: &VolumeConfig,
        tools: &Arc<ToolSet>,
        opts: &RunOptions,
        entry: &mut VolumeSummary,
    ) -> Option<HaltScope> {
        let source = self.root.join(&self.config.base_path).join(&volume.path);
        if !source.is_dir() {
            if opts.dry_run {
                tracing::warn!(dir = %source.display(), "source directory does not exist");
            } else {
                entry.status = VolumeStatus::Failed {
                    action: None,
                    error: FolioError::MissingDirectory(source).to_string(),
                };
                return None;
            }
        }

        let mut ctx = WorkerContext::new(&self.root, source, Arc::clone(tools), Arc::clone(&self.effects))
            .dry_run(opts.dry_run)
            .with_cancel(Arc::clone(&opts.cancel));
        let rules = RuleContext::new(&self.config, volume, opts.dry_run);

        for (index, (name, step)) in self.config.named_actions().into_iter().enumerate() {
            if !applies(step, &rules) {
                tracing::info!(action = %name, "condition false, skipping");
                entry.actions.push(ActionRecord {
                    name,
                    skipped: true,
                    report: None,
                });
                continue;
            }

            entry.status = VolumeStatus::Running { index };
            ctx.set_skip(resolve_skip(&volume.skip_actions, &name).cloned());
            tracing::info!(action = %name, cwd = %ctx.current_dir.display(), "action: running");

            let result = ctx
                .check_cancelled()
                .and_then(|()| step.action.run(&mut ctx, volume, &self.config));
            match result {
                Ok(report) => {
                    let halt = report.halt;
                    entry.actions.push(ActionRecord {
                        name: name.clone(),
                        skipped: false,
                        report: Some(report),
                    });
                    if let Some(scope) = halt {
                        entry.status = VolumeStatus::Halted { action: name };
                        return Some(scope);
                    }
                }
                Err(e) => {
                    entry.status = VolumeStatus::Failed {
                        action: Some(name),
                        error: e.to_string(),
                    };
                    return None;
                }
            }
        }
        ctx.set_skip(None);
        entry.status = VolumeStatus::Completed;
        None
    }
}

/// Directory containing the config file.
pub fn config_root(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Absent conditions always hold.
fn applies(step: &ActionStep, rules: &RuleContext<'_>) -> bool {
    step.conditions
        .as_ref()
        .map_or(true, |rule| rule.evaluate(rules))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{list, write_pages, RecordingEffects};
    use crate::tools::{Resolved, ToolKind};
    use tempfile::TempDir;

    struct Everything;

    impl ToolResolver for Everything {
        fn resolve(&self, name: &str, kind: ToolKind) -> Option<Resolved> {
            Some(match kind {
                ToolKind::Binary => Resolved::Binary(PathBuf::from(format!("/opt/tools/{name}"))),
                ToolKind::Package => Resolved::Package,
            })
        }
    }

    struct Nothing;

    impl ToolResolver for Nothing {
        fn resolve(&self, _: &str, _: ToolKind) -> Option<Resolved> {
            None
        }
    }

    const PIPELINE: &str = r#"
title: Series
publisher: Press
credit: Ripper
email: rip@example.com
volumes:
  - path: v01
    number: 1
    chapters:
      - { number: 1, start: 0 }
      - { number: 2, start: 10 }
    skip_actions:
      - { action: copy, step: optimize-1, pages: [10, 11] }
actions:
  - kind: optimize
"#;

    fn setup(yaml: &str) -> (TempDir, Driver, Arc<RecordingEffects>) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("folio.yaml");
        std::fs::write(&path, yaml).unwrap();
        let effects = Arc::new(RecordingEffects::default());
        let driver = Driver::from_path(&path).unwrap().with_effects(effects.clone());
        (dir, driver, effects)
    }

    fn pages(n: u32) -> Vec<String> {
        (0..n).map(|i| format!("Series - v01 - p{i:03}.png")).collect()
    }

    fn write_volume(dir: &Path, path: &str, n: u32) {
        let names = pages(n);
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        write_pages(&dir.join("source").join(path), &refs);
    }

    #[test]
    fn skip_policy_end_to_end_and_idempotent_rerun() {
        let (dir, driver, effects) = setup(PIPELINE);
        write_volume(dir.path(), "v01", 15);

        let ranges = driver.config().volumes[0].chapter_ranges().unwrap();
        assert_eq!((ranges[0].start, ranges[0].end), (0, Some(9)));
        assert_eq!((ranges[1].start, ranges[1].end), (10, None));

        let summary = driver.run(&Everything, &RunOptions::default()).unwrap();
        assert!(summary.success());
        let volume = &summary.volumes[0];
        assert_eq!(volume.status, VolumeStatus::Completed);
        let report = volume.actions[0].report.as_ref().unwrap();
        assert_eq!((report.processed, report.copied), (13, 2));
        assert_eq!(effects.count("optimize"), 13);
        assert!(!effects.calls().iter().any(|c| c.contains("p010") || c.contains("p011")));
        assert_eq!(list(&dir.path().join("optimized/v01")).len(), 15);

        let again = driver.run(&Everything, &RunOptions::default()).unwrap();
        let report = again.volumes[0].actions[0].report.as_ref().unwrap();
        assert_eq!(report.already_done, 15);
        assert_eq!(report.total(), 15);
        assert_eq!(effects.count("optimize"), 13);
    }

    #[test]
    fn missing_tools_reported_together_before_any_work() {
        let yaml = PIPELINE.replace(
            "actions:\n  - kind: optimize\n",
            "actions:\n  - kind: optimize\n  - kind: pack\n  - kind: tagging\n    conditions: { op: condition, field: volume, operator: '>', value: 5 }\n",
        );
        let (dir, driver, effects) = setup(&yaml);
        write_volume(dir.path(), "v01", 2);

        let err = driver.run(&Nothing, &RunOptions::default()).unwrap_err();
        match err {
            FolioError::ToolsUnavailable(missing) => {
                let names: Vec<&str> = missing.iter().map(|m| m.name.as_str()).collect();
                // tagging never applies, so exiftool is not required
                assert_eq!(names, vec!["7z", "pingo"]);
                assert_eq!(missing[1].needed_by, vec!["optimize-1"]);
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(effects.calls().is_empty());
        assert!(!dir.path().join("optimized").exists());

        let dry = RunOptions {
            dry_run: true,
            ..Default::default()
        };
        let summary = driver.run(&Nothing, &dry).unwrap();
        assert!(summary.dry_run);
        assert_eq!(summary.volumes[0].skipped(), 1);
        assert!(!dir.path().join("optimized").exists());
    }

    const TWO_VOLUMES: &str = r#"
title: Series
publisher: Press
credit: Ripper
email: rip@example.com
volumes:
  - { path: v01, number: 1 }
  - { path: v02, number: 2 }
actions:
  - kind: optimize
"#;

    #[test]
    fn failed_volume_does_not_stop_the_next() {
        let (dir, driver, _) = setup(TWO_VOLUMES);
        write_volume(dir.path(), "v02", 3);

        let summary = driver.run(&Everything, &RunOptions::default()).unwrap();
        assert!(matches!(
            &summary.volumes[0].status,
            VolumeStatus::Failed { action: None, .. }
        ));
        assert_eq!(summary.volumes[1].status, VolumeStatus::Completed);
        assert!(!summary.success());
    }

    #[test]
    fn empty_volume_flows_through_every_step() {
        let yaml = TWO_VOLUMES.replace(
            "actions:\n  - kind: optimize\n",
            "actions:\n  - kind: autolevel\n  - kind: optimize\n",
        );
        let (dir, driver, effects) = setup(&yaml);
        write_volume(dir.path(), "v01", 0);
        write_volume(dir.path(), "v02", 0);

        let summary = driver.run(&Everything, &RunOptions::default()).unwrap();
        assert!(summary.success());
        for volume in &summary.volumes {
            assert_eq!(volume.status, VolumeStatus::Completed);
            assert_eq!(volume.totals().total(), 0);
        }
        assert!(dir.path().join("leveled/v01").is_dir());
        assert!(dir.path().join("optimized/v02").is_dir());
        assert!(effects.calls().is_empty());
    }

    #[test]
    fn interrupt_halts_remaining_actions_and_volumes() {
        let yaml = TWO_VOLUMES.replace(
            "actions:\n  - kind: optimize\n",
            "actions:\n  - kind: interrupt\n  - kind: optimize\n",
        );
        let (dir, driver, effects) = setup(&yaml);
        write_volume(dir.path(), "v01", 2);
        write_volume(dir.path(), "v02", 2);

        let summary = driver.run(&Everything, &RunOptions::default()).unwrap();
        assert_eq!(
            summary.volumes[0].status,
            VolumeStatus::Halted {
                action: "interrupt-1".into()
            }
        );
        assert_eq!(summary.volumes[1].status, VolumeStatus::NotStarted);
        assert!(effects.calls().is_empty());
        assert!(summary.success());
    }

    #[test]
    fn volume_filter_and_unknown_numbers() {
        let (dir, driver, effects) = setup(TWO_VOLUMES);
        write_volume(dir.path(), "v02", 2);

        let only_two = RunOptions {
            volumes: vec![Number::Int(2)],
            ..Default::default()
        };
        let summary = driver.run(&Everything, &only_two).unwrap();
        assert_eq!(summary.volumes.len(), 1);
        assert!(summary.success());
        assert_eq!(effects.count("optimize"), 2);

        let bogus = RunOptions {
            volumes: vec![Number::Int(9)],
            ..Default::default()
        };
        assert!(matches!(
            driver.run(&Everything, &bogus),
            Err(FolioError::InvalidConfig(_))
        ));
    }

    #[test]
    fn cancelled_before_start_runs_nothing() {
        let (dir, driver, effects) = setup(TWO_VOLUMES);
        write_volume(dir.path(), "v01", 2);
        let opts = RunOptions::default();
        opts.cancel.store(true, Ordering::SeqCst);

        let summary = driver.run(&Everything, &opts).unwrap();
        assert!(summary.cancelled);
        assert!(!summary.success());
        assert!(effects.calls().is_empty());
    }

    #[test]
    fn unknown_skip_step_rejected_at_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("folio.yaml");
        std::fs::write(&path, PIPELINE.replace("optimize-1", "optimize-9")).unwrap();
        match Driver::from_path(&path) {
            Err(FolioError::InvalidConfig(issues)) => {
                assert_eq!(issues[0].field, "volumes[0].skip_actions[0].step");
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("config with unknown skip step accepted"),
        }
    }
}
