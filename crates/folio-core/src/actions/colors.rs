//! Actions over the pages a volume tags as color.

use super::pagewise::{run_batch, PageBatch};
use super::{check_range, check_threads, default_threads, ActionReport, PageResult, Step};
use crate::config::{ConfigIssue, OrchestratorConfig, VolumeConfig};
use crate::context::WorkerContext;
use crate::error::{FolioError, Result};
use crate::pages::{collect_pages, parse_page_number};
use crate::tools::{ToolKind, ToolRequirements};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

fn default_colors_path() -> PathBuf {
    PathBuf::from("colors")
}

/// Move color pages out of the current directory into `root/base_path/volume.path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveColorAction {
    #[serde(default = "default_colors_path")]
    pub base_path: PathBuf,
}

impl Default for MoveColorAction {
    fn default() -> Self {
        Self {
            base_path: default_colors_path(),
        }
    }
}

impl Step for MoveColorAction {
    fn run(
        &self,
        ctx: &mut WorkerContext,
        volume: &VolumeConfig,
        _config: &OrchestratorConfig,
    ) -> Result<ActionReport> {
        let out_dir = ctx.output_dir(&self.base_path, volume);
        if ctx.dry_run {
            tracing::info!(
                to = %out_dir.display(),
                pages = volume.colors.len(),
                "move_color (dry run)"
            );
            return Ok(ActionReport::default());
        }
        crate::io::ensure_dir(&out_dir)?;

        let mut report = ActionReport::default();
        for page in collect_pages(&ctx.current_dir)? {
            let number = match parse_page_number(page.name()) {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!("{e}, leaving in place");
                    continue;
                }
            };
            if !volume.is_color(number) {
                continue;
            }
            let dest = out_dir.join(page.name());
            if dest.exists() {
                tracing::warn!(dest = %dest.display(), "already done, skipping");
                report.record(&PageResult::AlreadyDone);
                continue;
            }
            crate::io::move_file(&page.path, &dest)?;
            report.record(&PageResult::Moved);
        }
        tracing::info!(to = %out_dir.display(), "move_color: {report}");
        Ok(report)
    }
}

fn default_jpeg_quality() -> u32 {
    95
}

/// Encode the color pages under `root/source_path/volume.path` to JPEG.
///
/// Output goes to `root/base_path/volume.path`, or to the current directory
/// when `base_path` is unset. The current directory does not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorJpegifyAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_path: Option<PathBuf>,
    #[serde(default = "default_jpeg_quality")]
    pub quality: u32,
    #[serde(default = "default_colors_path")]
    pub source_path: PathBuf,
    #[serde(default = "default_threads")]
    pub threads: usize,
}

impl Step for ColorJpegifyAction {
    fn run(
        &self,
        ctx: &mut WorkerContext,
        volume: &VolumeConfig,
        _config: &OrchestratorConfig,
    ) -> Result<ActionReport> {
        let source = ctx.output_dir(&self.source_path, volume);
        let out_dir = match &self.base_path {
            Some(base) => ctx.output_dir(base, volume),
            None => ctx.current_dir.clone(),
        };
        if ctx.dry_run {
            tracing::info!(
                from = %source.display(),
                to = %out_dir.display(),
                quality = self.quality,
                pages = volume.colors.len(),
                "color_jpegify (dry run)"
            );
            return Ok(ActionReport::default());
        }
        if !source.is_dir() {
            return Err(FolioError::MissingDirectory(source));
        }
        let cjpegli = ctx.tools.binary("cjpegli")?.to_path_buf();
        let effects = Arc::clone(&ctx.effects);
        let batch = PageBatch {
            label: "color_jpegify",
            source_dir: &source,
            out_dir: &out_dir,
            threads: self.threads,
            needs_colors: true,
            dest_ext: Some("jpg"),
            only_pages: Some(&volume.colors),
        };
        run_batch(ctx, volume, batch, |job| {
            effects.jpegify(&cjpegli, &job.src, &job.dest, self.quality)?;
            Ok(PageResult::Processed)
        })
    }

    fn required_tools(&self) -> ToolRequirements {
        ToolRequirements::from([("cjpegli".to_string(), ToolKind::Binary)])
    }

    fn validate(&self, prefix: &str, issues: &mut Vec<ConfigIssue>) {
        check_range(issues, format!("{prefix}.quality"), self.quality, 1, 100);
        check_threads(issues, prefix, self.threads);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, list, write_pages, RecordingEffects};
    use crate::types::{BracketStyle, Number};
    use tempfile::TempDir;

    fn fixture() -> (TempDir, OrchestratorConfig, VolumeConfig) {
        let dir = TempDir::new().unwrap();
        write_pages(
            &dir.path().join("work/v01"),
            &["p001.png", "p002.png", "p003.png", "notes.png"],
        );
        let cfg = OrchestratorConfig::template("T", "P", "C", "e@x", BracketStyle::Round);
        let mut volume = VolumeConfig::new(Number::Int(1), "v01");
        volume.colors = [1, 3].into_iter().collect();
        (dir, cfg, volume)
    }

    #[test]
    fn move_then_jpegify_color_pages() {
        let (dir, cfg, volume) = fixture();
        let work = dir.path().join("work/v01");
        let effects = Arc::new(RecordingEffects::default());
        let mut ctx = context(dir.path(), &work, effects.clone());

        let moved = MoveColorAction::default().run(&mut ctx, &volume, &cfg).unwrap();
        assert_eq!(moved.moved, 2);
        assert_eq!(ctx.current_dir, work);
        assert_eq!(list(&work), vec!["notes.png", "p002.png"]);
        assert_eq!(list(&dir.path().join("colors/v01")), vec!["p001.png", "p003.png"]);

        let action: ColorJpegifyAction = serde_yaml::from_str("{}").unwrap();
        let report = action.run(&mut ctx, &volume, &cfg).unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(list(&work), vec!["notes.png", "p001.jpg", "p002.png", "p003.jpg"]);
        assert_eq!(effects.count("jpegify"), 2);
    }

    #[test]
    fn missing_source_tree_fails() {
        let (dir, cfg, volume) = fixture();
        let effects = Arc::new(RecordingEffects::default());
        let mut ctx = context(dir.path(), &dir.path().join("work/v01"), effects);
        let action: ColorJpegifyAction = serde_yaml::from_str("source_path: nowhere").unwrap();
        let err = action.run(&mut ctx, &volume, &cfg).unwrap_err();
        assert!(matches!(err, FolioError::MissingDirectory(_)));
    }
}
