//! The closed catalog of pipeline steps.
//!
//! Every step is `{kind, conditions?, ...params}` in the config file. An
//! action's instance name is `{kind}-{n}` where `n` counts that kind so far.

mod colors;
mod control;
mod pack;
mod pagewise;
mod rename;
mod spreads;
mod tagging;
mod transform;

pub use colors::{ColorJpegifyAction, MoveColorAction};
pub use control::{ChangeCwdAction, InterruptAction};
pub use pack::{PackAction, PackFormat};
pub use rename::{RenameAction, ShiftRenameAction};
pub use spreads::{OutputFormat, SpreadDirection, SpreadsAction};
pub use tagging::TaggingAction;
pub use transform::{
    AutolevelAction, DenoiseAction, OptimizeAction, PosterizeAction, RescaleAction,
    RescaleTarget, ResizeKernel, UpscaleAction,
};

use crate::config::{ConfigIssue, OrchestratorConfig, VolumeConfig};
use crate::context::WorkerContext;
use crate::error::Result;
use crate::rules::RuleExpr;
use crate::tools::ToolRequirements;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ShiftRename,
    Rename,
    Spreads,
    Denoise,
    Upscale,
    Rescale,
    Autolevel,
    Posterize,
    Optimize,
    ColorJpegify,
    MoveColor,
    Tagging,
    Pack,
    ChangeCwd,
    Interrupt,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::ShiftRename => "shift_rename",
            ActionKind::Rename => "rename",
            ActionKind::Spreads => "spreads",
            ActionKind::Denoise => "denoise",
            ActionKind::Upscale => "upscale",
            ActionKind::Rescale => "rescale",
            ActionKind::Autolevel => "autolevel",
            ActionKind::Posterize => "posterize",
            ActionKind::Optimize => "optimize",
            ActionKind::ColorJpegify => "color_jpegify",
            ActionKind::MoveColor => "move_color",
            ActionKind::Tagging => "tagging",
            ActionKind::Pack => "pack",
            ActionKind::ChangeCwd => "change_cwd",
            ActionKind::Interrupt => "interrupt",
        }
    }

    /// Whether the action works file by file and so honors skip policies.
    pub fn is_page_scoped(self) -> bool {
        matches!(
            self,
            ActionKind::Denoise
                | ActionKind::Upscale
                | ActionKind::Rescale
                | ActionKind::Autolevel
                | ActionKind::Posterize
                | ActionKind::Optimize
                | ActionKind::ColorJpegify
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of one page-scoped unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageResult {
    Processed,
    Copied,
    Moved,
    Ignored,
    AlreadyDone,
    Failed(String),
}

/// How far an interrupt reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltScope {
    /// Stop the rest of this volume's actions.
    Volume,
    /// Also stop every volume not yet started.
    Run,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActionReport {
    pub processed: usize,
    pub copied: usize,
    pub moved: usize,
    pub ignored: usize,
    pub already_done: usize,
    pub failed: usize,
    pub renamed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt: Option<HaltScope>,
}

impl ActionReport {
    pub fn record(&mut self, result: &PageResult) {
        match result {
            PageResult::Processed => self.processed += 1,
            PageResult::Copied => self.copied += 1,
            PageResult::Moved => self.moved += 1,
            PageResult::Ignored => self.ignored += 1,
            PageResult::AlreadyDone => self.already_done += 1,
            PageResult::Failed(_) => self.failed += 1,
        }
    }

    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a PageResult>) -> Self {
        let mut report = Self::default();
        for r in results {
            report.record(r);
        }
        report
    }

    pub fn total(&self) -> usize {
        self.processed + self.copied + self.moved + self.ignored + self.already_done + self.failed
    }
}

impl fmt::Display for ActionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} copied={} moved={} ignored={} already_done={} failed={}",
            self.processed, self.copied, self.moved, self.ignored, self.already_done, self.failed
        )?;
        if self.renamed > 0 {
            write!(f, " renamed={}", self.renamed)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Step contract
// ---------------------------------------------------------------------------

/// Behavior shared by every action's parameter struct.
pub(crate) trait Step {
    fn run(
        &self,
        ctx: &mut WorkerContext,
        volume: &VolumeConfig,
        config: &OrchestratorConfig,
    ) -> Result<ActionReport>;

    fn required_tools(&self) -> ToolRequirements {
        ToolRequirements::new()
    }

    fn validate(&self, _prefix: &str, _issues: &mut Vec<ConfigIssue>) {}
}

pub(crate) fn check_range<T>(issues: &mut Vec<ConfigIssue>, field: String, value: T, lo: T, hi: T)
where
    T: PartialOrd + fmt::Display + Copy,
{
    if value < lo || value > hi {
        issues.push(ConfigIssue::error(
            field,
            format!("{value} is outside {lo}..={hi}"),
        ));
    }
}

pub(crate) fn check_threads(issues: &mut Vec<ConfigIssue>, prefix: &str, threads: usize) {
    if threads < 1 {
        issues.push(ConfigIssue::error(
            format!("{prefix}.threads"),
            "threads must be at least 1",
        ));
    }
}

pub(crate) fn default_threads() -> usize {
    crate::pool::default_threads()
}

// ---------------------------------------------------------------------------
// Action / ActionStep
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    ShiftRename(ShiftRenameAction),
    Rename(RenameAction),
    Spreads(SpreadsAction),
    Denoise(DenoiseAction),
    Upscale(UpscaleAction),
    Rescale(RescaleAction),
    Autolevel(AutolevelAction),
    Posterize(PosterizeAction),
    Optimize(OptimizeAction),
    ColorJpegify(ColorJpegifyAction),
    MoveColor(MoveColorAction),
    Tagging(TaggingAction),
    Pack(PackAction),
    ChangeCwd(ChangeCwdAction),
    Interrupt(InterruptAction),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::ShiftRename(_) => ActionKind::ShiftRename,
            Action::Rename(_) => ActionKind::Rename,
            Action::Spreads(_) => ActionKind::Spreads,
            Action::Denoise(_) => ActionKind::Denoise,
            Action::Upscale(_) => ActionKind::Upscale,
            Action::Rescale(_) => ActionKind::Rescale,
            Action::Autolevel(_) => ActionKind::Autolevel,
            Action::Posterize(_) => ActionKind::Posterize,
            Action::Optimize(_) => ActionKind::Optimize,
            Action::ColorJpegify(_) => ActionKind::ColorJpegify,
            Action::MoveColor(_) => ActionKind::MoveColor,
            Action::Tagging(_) => ActionKind::Tagging,
            Action::Pack(_) => ActionKind::Pack,
            Action::ChangeCwd(_) => ActionKind::ChangeCwd,
            Action::Interrupt(_) => ActionKind::Interrupt,
        }
    }

    fn step(&self) -> &dyn Step {
        match self {
            Action::ShiftRename(a) => a,
            Action::Rename(a) => a,
            Action::Spreads(a) => a,
            Action::Denoise(a) => a,
            Action::Upscale(a) => a,
            Action::Rescale(a) => a,
            Action::Autolevel(a) => a,
            Action::Posterize(a) => a,
            Action::Optimize(a) => a,
            Action::ColorJpegify(a) => a,
            Action::MoveColor(a) => a,
            Action::Tagging(a) => a,
            Action::Pack(a) => a,
            Action::ChangeCwd(a) => a,
            Action::Interrupt(a) => a,
        }
    }

    /// Tools this action needs, derived from its parameters alone.
    pub fn required_tools(&self) -> ToolRequirements {
        self.step().required_tools()
    }

    pub fn run(
        &self,
        ctx: &mut WorkerContext,
        volume: &VolumeConfig,
        config: &OrchestratorConfig,
    ) -> Result<ActionReport> {
        self.step().run(ctx, volume, config)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<RuleExpr>,
    #[serde(flatten)]
    pub action: Action,
}

impl ActionStep {
    pub fn new(action: Action) -> Self {
        Self {
            conditions: None,
            action,
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }

    pub fn validate(&self, prefix: &str) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if let Some(rule) = &self.conditions {
            for (field, message) in rule.problems(&format!("{prefix}.conditions")) {
                issues.push(ConfigIssue::error(field, message));
            }
        }
        self.action.step().validate(prefix, &mut issues);
        issues
    }
}
