use super::pack::release_name;
use super::{ActionReport, Step};
use crate::config::{OrchestratorConfig, VolumeConfig};
use crate::context::WorkerContext;
use crate::error::{FolioError, Result};
use crate::tools::{ToolKind, ToolRequirements};
use serde::{Deserialize, Serialize};

/// Write release title and author email into every image of the current directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaggingAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Step for TaggingAction {
    fn run(
        &self,
        ctx: &mut WorkerContext,
        volume: &VolumeConfig,
        config: &OrchestratorConfig,
    ) -> Result<ActionReport> {
        let title = release_name(self.title.as_deref().unwrap_or(&config.title), volume, config);
        if ctx.dry_run {
            tracing::info!(title = %title, email = %config.email, "tagging (dry run)");
            return Ok(ActionReport::default());
        }
        if !ctx.current_dir.is_dir() {
            return Err(FolioError::MissingDirectory(ctx.current_dir.clone()));
        }
        let exiftool = ctx.tools.binary("exiftool")?;
        tracing::info!(dir = %ctx.current_dir.display(), title = %title, "tagging images");
        ctx.effects.tag(exiftool, &ctx.current_dir, &title, &config.email)?;
        Ok(ActionReport {
            processed: 1,
            ..Default::default()
        })
    }

    fn required_tools(&self) -> ToolRequirements {
        ToolRequirements::from([("exiftool".to_string(), ToolKind::Binary)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, write_pages, RecordingEffects};
    use crate::types::{BracketStyle, Number};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn tags_current_directory_once() {
        let dir = TempDir::new().unwrap();
        let work = dir.path().join("v01");
        write_pages(&work, &["p001.png"]);
        let cfg = OrchestratorConfig::template("T", "P", "C", "e@x", BracketStyle::Round);
        let volume = VolumeConfig::new(Number::Int(1), "v01");
        let effects = Arc::new(RecordingEffects::default());
        let mut ctx = context(dir.path(), &work, effects.clone());

        TaggingAction::default().run(&mut ctx, &volume, &cfg).unwrap();
        assert_eq!(effects.calls(), vec!["tag v01"]);
    }
}
