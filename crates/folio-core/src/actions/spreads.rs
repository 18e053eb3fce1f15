use super::transform::magick_backend;
use super::{check_range, check_threads, default_threads, ActionReport, PageResult, Step};
use crate::config::{ConfigIssue, OrchestratorConfig, VolumeConfig};
use crate::context::WorkerContext;
use crate::effects::Backend;
use crate::error::{FolioError, Result};
use crate::pages::{collect_pages, PageName};
use crate::tools::{ToolKind, ToolRequirements};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpreadDirection {
    #[default]
    Ltr,
    /// Right-to-left: the later page ends up on the left.
    Rtl,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// `jpg` when every source is a JPEG, `png` otherwise.
    #[default]
    Auto,
    Jpg,
    Png,
}

fn default_quality() -> u32 {
    100
}

/// Join each configured spread range into one image, in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadsAction {
    #[serde(default)]
    pub direction: SpreadDirection,
    #[serde(default = "default_quality")]
    pub quality: u32,
    #[serde(default)]
    pub output_fmt: OutputFormat,
    #[serde(default)]
    pub native: bool,
    #[serde(default = "default_threads")]
    pub threads: usize,
}

/// Pages of one `[first, last]` range, with the name parts of its first page.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SpreadGroup {
    pub first: u32,
    pub last: u32,
    pub prefix: String,
    pub suffix: String,
    pub images: Vec<PathBuf>,
}

impl SpreadGroup {
    fn extension(&self, format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Jpg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Auto => {
                let all_jpeg = self.images.iter().all(|p| {
                    p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| matches!(e.to_lowercase().as_str(), "jpg" | "jpeg"))
                });
                if all_jpeg {
                    "jpg"
                } else {
                    "png"
                }
            }
        }
    }

    pub fn file_name(&self, format: OutputFormat) -> String {
        format!(
            "{}p{:03}-{:03}{}.{}",
            self.prefix,
            self.first,
            self.last,
            self.suffix,
            self.extension(format)
        )
    }
}

/// Group the pages of `dir` by the spread range they fall in.
///
/// Pages already joined (`p004-005`) are left out.
pub(crate) fn group_spreads(dir: &Path, spreads: &[[u32; 2]]) -> Result<Vec<SpreadGroup>> {
    let mut groups: BTreeMap<(u32, u32), SpreadGroup> = BTreeMap::new();
    for page in collect_pages(dir)? {
        let name = PageName::parse(page.stem())
            .ok_or_else(|| FolioError::PageParse(page.name().to_string()))?;
        if name.is_joined() {
            continue;
        }
        let Some([first, last]) = spreads
            .iter()
            .find(|[a, b]| (*a..=*b).contains(&name.first))
            .copied()
        else {
            continue;
        };
        groups
            .entry((first, last))
            .or_insert_with(|| SpreadGroup {
                first,
                last,
                prefix: name.prefix.clone(),
                suffix: name.suffix.clone(),
                images: Vec::new(),
            })
            .images
            .push(page.path);
    }
    Ok(groups.into_values().collect())
}

impl Step for SpreadsAction {
    fn run(
        &self,
        ctx: &mut WorkerContext,
        volume: &VolumeConfig,
        _config: &OrchestratorConfig,
    ) -> Result<ActionReport> {
        if ctx.dry_run {
            tracing::info!(
                direction = ?self.direction,
                quality = self.quality,
                format = ?self.output_fmt,
                native = self.native,
                spreads = volume.spreads.len(),
                "spreads (dry run)"
            );
            return Ok(ActionReport::default());
        }
        if volume.spreads.is_empty() {
            tracing::warn!(volume = %volume.number, "no spreads configured, skipping");
            return Ok(ActionReport::default());
        }
        let magick = magick_backend(ctx, self.native)?;

        let current = ctx.current_dir.clone();
        let groups: Vec<SpreadGroup> = group_spreads(&current, &volume.spreads)?
            .into_iter()
            .filter(|g| {
                if g.images.len() < 2 {
                    tracing::warn!(first = g.first, last = g.last, "spread has fewer than 2 pages, skipping");
                }
                g.images.len() >= 2
            })
            .collect();
        if groups.is_empty() {
            tracing::warn!(dir = %current.display(), "no spread pages found, skipping");
            return Ok(ActionReport::default());
        }

        tracing::info!(spreads = groups.len(), threads = self.threads, "spreads: joining");
        let effects = Arc::clone(&ctx.effects);
        let results = crate::pool::fan_out(self.threads, &groups, &ctx.cancel, |group| {
            let dest = current.join(group.file_name(self.output_fmt));
            if dest.exists() {
                tracing::warn!(dest = %dest.display(), "already done, skipping");
                return PageResult::AlreadyDone;
            }
            let backend = magick.as_deref().map_or(Backend::Native, Backend::Binary);
            match effects.join_spreads(backend, &group.images, &dest, self.direction, self.quality) {
                Ok(()) => PageResult::Processed,
                Err(e) => {
                    tracing::warn!(dest = %dest.display(), "{e}");
                    PageResult::Failed(e.to_string())
                }
            }
        })?;

        let dir_name = current.file_name().map(PathBuf::from).unwrap_or_default();
        let backup = ctx.root_dir.join("backup").join(dir_name);
        crate::io::ensure_dir(&backup)?;
        for (group, result) in groups.iter().zip(&results) {
            if *result != PageResult::Processed {
                continue;
            }
            for img in &group.images {
                if let Some(name) = img.file_name() {
                    crate::io::move_file(img, &backup.join(name))?;
                }
            }
        }
        tracing::info!(backup = %backup.display(), "spreads: originals backed up");

        Ok(ActionReport::from_results(results.iter()))
    }

    fn required_tools(&self) -> ToolRequirements {
        if self.native {
            ToolRequirements::from([("image".to_string(), ToolKind::Package)])
        } else {
            ToolRequirements::from([("magick".to_string(), ToolKind::Binary)])
        }
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

    #[test]
    fn joins_ranges_and_backs_up_originals() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source/v01");
        write_pages(
            &src,
            &["T - p001.png", "T - p002.jpg", "T - p003.jpg", "T - p004.png", "T - p006-007.png"],
        );
        let cfg = OrchestratorConfig::template("T", "P", "C", "e@x", BracketStyle::Round);
        let mut volume = VolumeConfig::new(Number::Int(1), "v01");
        volume.spreads = vec![[2, 3], [6, 7]];

        let effects = Arc::new(RecordingEffects::default());
        let mut ctx = context(dir.path(), &src, effects.clone());
        let action: SpreadsAction = serde_yaml::from_str("direction: rtl").unwrap();
        let report = action.run(&mut ctx, &volume, &cfg).unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(
            list(&src),
            vec!["T - p001.png", "T - p002-003.jpg", "T - p004.png", "T - p006-007.png"]
        );
        assert_eq!(
            list(&dir.path().join("backup/v01")),
            vec!["T - p002.jpg", "T - p003.jpg"]
        );
        assert_eq!(ctx.current_dir, src);
    }

    #[test]
    fn explicit_format_overrides_auto() {
        let group = SpreadGroup {
            first: 10,
            last: 11,
            prefix: "S - ".into(),
            suffix: " [dig]".into(),
            images: vec!["a.jpg".into(), "b.png".into()],
        };
        assert_eq!(group.file_name(OutputFormat::Auto), "S - p010-011 [dig].png");
        assert_eq!(group.file_name(OutputFormat::Jpg), "S - p010-011 [dig].jpg");
    }

    #[test]
    fn native_needs_image_package() {
        let action: SpreadsAction = serde_yaml::from_str("native: true\nquality: 0").unwrap();
        assert!(action.required_tools().contains_key("image"));
        let mut issues = Vec::new();
        action.validate("actions[0]", &mut issues);
        assert_eq!(issues[0].field, "actions[0].quality");
    }
}
