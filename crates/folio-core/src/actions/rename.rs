//! In-place rename actions.
//!
//! Both actions compute the whole batch of `(from, to)` pairs first, reject
//! collisions before touching disk, and undo completed renames if one fails
//! midway.

use super::{check_range, ActionReport, Step};
use crate::chapters::{find_chapter, ChapterRange};
use crate::config::{ConfigIssue, OrchestratorConfig, VolumeConfig};
use crate::context::WorkerContext;
use crate::error::{FolioError, Result};
use crate::naming::{volume_text, PageNaming};
use crate::pages::{collect_pages, natural_cmp, PageFile};
use crate::types::Number;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Batch execution
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub(crate) struct RenameBatch {
    moves: Vec<(PathBuf, PathBuf)>,
}

fn conflict(target: &std::path::Path, reason: &str) -> FolioError {
    FolioError::Conflict {
        target: target.display().to_string(),
        reason: reason.to_string(),
    }
}

impl RenameBatch {
    /// Queue a rename; identity renames are dropped.
    pub fn push(&mut self, from: PathBuf, to: PathBuf) {
        if from != to {
            self.moves.push((from, to));
        }
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    fn sources(&self) -> BTreeSet<&PathBuf> {
        self.moves.iter().map(|(from, _)| from).collect()
    }

    pub fn check(&self) -> Result<()> {
        let sources = self.sources();
        let mut targets = BTreeSet::new();
        for (_, to) in &self.moves {
            if !targets.insert(to) {
                return Err(conflict(to, "two pages would get the same name"));
            }
            if to.exists() && !sources.contains(to) {
                return Err(conflict(to, "destination already exists"));
            }
        }
        Ok(())
    }

    /// Check, then rename everything. Returns the number of files renamed.
    pub fn execute(self) -> Result<usize> {
        self.check()?;
        let count = self.moves.len();
        let sources = self.sources();
        // a target that is also a pending source needs a staging hop
        let staged = self.moves.iter().any(|(_, to)| sources.contains(to));

        let steps: Vec<(PathBuf, PathBuf)> = if staged {
            let hops: Vec<(PathBuf, PathBuf, PathBuf)> = self
                .moves
                .iter()
                .enumerate()
                .map(|(i, (from, to))| {
                    let tmp = from.with_file_name(format!(".folio-rename-{i}.tmp"));
                    (from.clone(), tmp, to.clone())
                })
                .collect();
            hops.iter()
                .map(|(from, tmp, _)| (from.clone(), tmp.clone()))
                .chain(hops.iter().map(|(_, tmp, to)| (tmp.clone(), to.clone())))
                .collect()
        } else {
            self.moves.clone()
        };

        let mut done: Vec<&(PathBuf, PathBuf)> = Vec::new();
        for step in &steps {
            let (from, to) = step;
            if to.exists() {
                revert(&done);
                return Err(conflict(to, "destination appeared during rename"));
            }
            if let Err(e) = std::fs::rename(from, to) {
                revert(&done);
                return Err(e.into());
            }
            done.push(step);
        }
        Ok(count)
    }
}

fn revert(done: &[&(PathBuf, PathBuf)]) {
    tracing::warn!(count = done.len(), "reverting renames");
    for (from, to) in done.iter().rev() {
        if let Err(e) = std::fs::rename(to, from) {
            tracing::warn!(file = %to.display(), "could not revert rename: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// shift_rename
// ---------------------------------------------------------------------------

/// Renumber every page to `{title} - {vol} - p{n}`, counting from `start`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShiftRenameAction {
    #[serde(default)]
    pub start: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ShiftRenameAction {
    pub(crate) fn plan(&self, pages: &[PageFile], title: &str, volume: &VolumeConfig) -> RenameBatch {
        let mut sorted: Vec<&PageFile> = pages.iter().collect();
        sorted.sort_by(|a, b| natural_cmp(a.stem(), b.stem()));

        let start = self.start.max(0) as usize;
        let last = (start + sorted.len()).saturating_sub(1);
        let width = last.to_string().len().max(3);
        let vol = volume_text(volume.number);

        let mut batch = RenameBatch::default();
        for (i, page) in sorted.into_iter().enumerate() {
            let name = format!(
                "{title} - {vol} - p{:0width$}.{}",
                start + i,
                page.extension()
            );
            batch.push(page.path.clone(), page.path.with_file_name(name));
        }
        batch
    }
}

impl Step for ShiftRenameAction {
    fn run(
        &self,
        ctx: &mut WorkerContext,
        volume: &VolumeConfig,
        config: &OrchestratorConfig,
    ) -> Result<ActionReport> {
        let title = self.title.as_deref().unwrap_or(&config.title);
        if ctx.dry_run {
            tracing::info!(start = self.start, title, "shift_rename (dry run)");
            return Ok(ActionReport::default());
        }
        let pages = collect_pages(&ctx.current_dir)?;
        let batch = self.plan(&pages, title, volume);
        tracing::info!(pages = pages.len(), changes = batch.len(), "shift_rename: renaming");
        let renamed = batch.execute()?;
        Ok(ActionReport {
            renamed,
            ..Default::default()
        })
    }

    fn validate(&self, prefix: &str, issues: &mut Vec<ConfigIssue>) {
        check_range(issues, format!("{prefix}.start"), self.start, 0, i64::from(u32::MAX));
    }
}

// ---------------------------------------------------------------------------
// rename
// ---------------------------------------------------------------------------

fn cmx_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<t>.+?)(?:- (?P<vol>v\d{1,3}))?(?P<volex>\.\d{1,2})? - p(?P<a>\d{1,3})-?(?P<b>\d{1,3})?",
        )
        .expect("static regex")
    })
}

/// What the rename needs from a file name shaped like `{title} - v01 - p012`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedPage {
    /// `012` or `012-013`, as written.
    pub page: String,
    pub first: u32,
    pub volume: Option<u32>,
    /// Fraction digits after the volume number, as written.
    pub volume_extra: Option<String>,
}

pub(crate) fn parse_page(name: &str) -> Option<ParsedPage> {
    let caps = cmx_re().captures(name)?;
    let a = caps.name("a")?.as_str();
    let page = match caps.name("b") {
        Some(b) => format!("{a}-{}", b.as_str()),
        None => a.to_string(),
    };
    Some(ParsedPage {
        first: a.parse().ok()?,
        page,
        volume: caps
            .name("vol")
            .and_then(|v| v.as_str().trim_start_matches('v').parse().ok()),
        volume_extra: caps
            .name("volex")
            .map(|v| v.as_str().trim_start_matches('.').to_string()),
    })
}

/// The volume number a page belongs to; `None` for oneshots.
fn page_volume(volume: &VolumeConfig, parsed: &ParsedPage) -> Option<Number> {
    if volume.oneshot {
        return None;
    }
    let base = parsed.volume.map(Number::Int).unwrap_or(volume.number);
    match &parsed.volume_extra {
        Some(extra) => format!("{}.{extra}", base.base()).parse().ok().map(Number::Decimal),
        None => Some(base),
    }
}

/// Rename every page to the catalog naming convention.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenameAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl RenameAction {
    pub(crate) fn plan(
        &self,
        pages: &[PageFile],
        volume: &VolumeConfig,
        config: &OrchestratorConfig,
    ) -> Result<RenameBatch> {
        let ranges = volume.chapter_ranges()?;
        let meta = volume.meta_name_map();
        let title = self.title.as_deref().unwrap_or(&config.title);

        let mut batch = RenameBatch::default();
        for page in pages {
            let parsed = parse_page(page.name())
                .ok_or_else(|| FolioError::PageParse(page.name().to_string()))?;
            let chapter = find_chapter(&ranges, parsed.first).ok_or_else(|| FolioError::NoChapter {
                file: page.name().to_string(),
                page: parsed.first,
            })?;
            let siblings: Vec<&ChapterRange> = ranges
                .iter()
                .filter(|c| c.number.base() == chapter.number.base())
                .collect();

            let stem = PageNaming {
                title,
                publisher: &config.publisher,
                chapter,
                siblings: &siblings,
                page: &parsed.page,
                publication: volume.pub_type,
                credit: &config.credit,
                volume: page_volume(volume, &parsed),
                extra: meta.get(&parsed.first).copied(),
                quality: volume.quality,
                revision: volume.revision,
            }
            .format();

            let name = match page.path.extension().and_then(|e| e.to_str()) {
                Some(ext) => format!("{stem}.{ext}"),
                None => stem,
            };
            batch.push(page.path.clone(), page.path.with_file_name(name));
        }
        Ok(batch)
    }
}

impl Step for RenameAction {
    fn run(
        &self,
        ctx: &mut WorkerContext,
        volume: &VolumeConfig,
        config: &OrchestratorConfig,
    ) -> Result<ActionReport> {
        if ctx.dry_run {
            tracing::info!(
                title = self.title.as_deref().unwrap_or(&config.title),
                chapters = volume.chapters.len(),
                "rename (dry run)"
            );
            return Ok(ActionReport::default());
        }
        let pages = collect_pages(&ctx.current_dir)?;
        if pages.is_empty() {
            tracing::warn!(dir = %ctx.current_dir.display(), "rename: no pages found");
            return Ok(ActionReport::default());
        }
        let batch = self.plan(&pages, volume, config)?;
        tracing::info!(pages = pages.len(), changes = batch.len(), "rename: renaming");
        let renamed = batch.execute()?;
        Ok(ActionReport {
            renamed,
            ..Default::default()
        })
    }
}
