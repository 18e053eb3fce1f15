use super::{check_range, ActionReport, Step};
use crate::config::{ConfigIssue, OrchestratorConfig, VolumeConfig};
use crate::context::WorkerContext;
use crate::error::{FolioError, Result};
use crate::naming::{volume_text, ArchiveName};
use crate::pages::collect_pages;
use crate::tools::{ToolKind, ToolRequirements};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackFormat {
    #[default]
    Cbz,
    Cb7,
}

impl PackFormat {
    pub fn extension(self) -> &'static str {
        match self {
            PackFormat::Cbz => "cbz",
            PackFormat::Cb7 => "cb7",
        }
    }
}

/// The volume's release name, shared by archives and image metadata.
pub(crate) fn release_name(title: &str, volume: &VolumeConfig, config: &OrchestratorConfig) -> String {
    ArchiveName {
        title,
        year: volume.year,
        publication: volume.pub_type,
        credit: &config.credit,
        bracket: config.bracket_type,
        volume_text: (!volume.oneshot).then(|| volume_text(volume.number)),
        extra: volume.extra_text.as_deref(),
        revision: volume.revision,
    }
    .format()
}

fn default_compress_level() -> u32 {
    7
}

/// Archive the current directory (or `source_dir`) next to itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackAction {
    #[serde(default)]
    pub output_mode: PackFormat,
    /// Directory to pack, relative to the config root. Defaults to the current directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,
    #[serde(default = "default_compress_level")]
    pub compress_level: u32,
}

impl Step for PackAction {
    fn run(
        &self,
        ctx: &mut WorkerContext,
        volume: &VolumeConfig,
        config: &OrchestratorConfig,
    ) -> Result<ActionReport> {
        let source = match &self.source_dir {
            Some(dir) => ctx.root_dir.join(dir),
            None => ctx.current_dir.clone(),
        };
        let name = release_name(&config.title, volume, config);
        let parent = source.parent().map(PathBuf::from).unwrap_or_else(|| source.clone());
        let archive = parent.join(format!("{name}.{}", self.output_mode.extension()));

        if ctx.dry_run {
            tracing::info!(
                from = %source.display(),
                archive = %archive.display(),
                level = self.compress_level,
                "pack (dry run)"
            );
            return Ok(ActionReport::default());
        }
        if archive.exists() {
            tracing::warn!(archive = %archive.display(), "already done, skipping");
            return Ok(ActionReport {
                already_done: 1,
                ..Default::default()
            });
        }

        let files: Vec<PathBuf> = collect_pages(&source)?.into_iter().map(|p| p.path).collect();
        if files.is_empty() {
            tracing::warn!(dir = %source.display(), "pack: no pages found, skipping");
            return Ok(ActionReport::default());
        }
        ctx.check_cancelled()?;

        let sevenzip = ctx.tools.binary("7z")?;
        tracing::info!(files = files.len(), archive = %archive.display(), "pack: archiving");
        if let Err(e) = ctx
            .effects
            .pack(sevenzip, &files, &archive, self.output_mode, self.compress_level)
        {
            if archive.exists() {
                if let Err(rm) = std::fs::remove_file(&archive) {
                    tracing::warn!(archive = %archive.display(), "could not remove partial archive: {rm}");
                }
            }
            return Err(e);
        }
        if !archive.exists() {
            return Err(FolioError::Transform {
                tool: "7z".to_string(),
                file: archive.display().to_string(),
                reason: "archive was not created".to_string(),
            });
        }
        Ok(ActionReport {
            processed: files.len(),
            ..Default::default()
        })
    }

    fn required_tools(&self) -> ToolRequirements {
        ToolRequirements::from([("7z".to_string(), ToolKind::Binary)])
    }

    fn validate(&self, prefix: &str, issues: &mut Vec<ConfigIssue>) {
        check_range(issues, format!("{prefix}.compress_level"), self.compress_level, 0, 9);
    }
}
