//! Actions that steer the pipeline instead of touching pages.

use super::{ActionReport, HaltScope, Step};
use crate::config::{ConfigIssue, OrchestratorConfig, VolumeConfig};
use crate::context::WorkerContext;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Point the current directory at `root/directory/volume.path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeCwdAction {
    pub directory: String,
}

impl Step for ChangeCwdAction {
    fn run(
        &self,
        ctx: &mut WorkerContext,
        volume: &VolumeConfig,
        _config: &OrchestratorConfig,
    ) -> Result<ActionReport> {
        let dir = ctx.output_dir(Path::new(&self.directory), volume);
        if !ctx.dry_run && !dir.is_dir() {
            tracing::warn!(dir = %dir.display(), "change_cwd target does not exist yet");
        }
        ctx.update_cwd(dir);
        Ok(ActionReport::default())
    }

    fn validate(&self, prefix: &str, issues: &mut Vec<ConfigIssue>) {
        if self.directory.trim().is_empty() {
            issues.push(ConfigIssue::error(
                format!("{prefix}.directory"),
                "directory must not be empty",
            ));
        }
    }
}

fn default_whole_chain() -> bool {
    true
}

/// Stop the pipeline here. With `whole_chain`, no later volume starts either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptAction {
    #[serde(default = "default_whole_chain")]
    pub whole_chain: bool,
}

impl Default for InterruptAction {
    fn default() -> Self {
        Self {
            whole_chain: default_whole_chain(),
        }
    }
}

impl Step for InterruptAction {
    fn run(
        &self,
        ctx: &mut WorkerContext,
        volume: &VolumeConfig,
        _config: &OrchestratorConfig,
    ) -> Result<ActionReport> {
        if ctx.dry_run {
            tracing::info!(whole_chain = self.whole_chain, "interrupt (dry run)");
            return Ok(ActionReport::default());
        }
        let scope = if self.whole_chain {
            HaltScope::Run
        } else {
            HaltScope::Volume
        };
        tracing::warn!(volume = %volume.number, ?scope, "interrupt: halting");
        Ok(ActionReport {
            halt: Some(scope),
            ..Default::default()
        })
    }
}
