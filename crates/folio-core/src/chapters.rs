//! Chapter start pages → page ranges.

use crate::config::ConfigIssue;
use crate::error::{FolioError, Result};
use crate::types::Number;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterConfig {
    pub number: Number,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub start: u32,
}

/// A resolved chapter. `end == None` means the range is open (`[start, ∞)`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterRange {
    pub number: Number,
    pub title: Option<String>,
    pub start: u32,
    pub end: Option<u32>,
}

impl ChapterRange {
    pub fn is_open_ended(&self) -> bool {
        self.end.is_none()
    }

    pub fn contains(&self, page: u32) -> bool {
        page >= self.start && self.end.map_or(true, |end| page <= end)
    }
}

impl fmt::Display for ChapterRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "c{} [{}..={}]", self.number, self.start, end),
            None => write!(f, "c{} [{}..)", self.number, self.start),
        }
    }
}

/// Every precondition violation in `chapters`, with paths relative to `prefix`.
pub fn check_chapters(chapters: &[ChapterConfig], prefix: &str) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();

    for (i, ch) in chapters.iter().enumerate() {
        if ch.number.is_negative() {
            issues.push(ConfigIssue::error(
                format!("{prefix}[{i}].number"),
                format!("chapter number {} must not be negative", ch.number),
            ));
        }
        if chapters[..i].iter().any(|prev| prev.number == ch.number) {
            issues.push(ConfigIssue::error(
                format!("{prefix}[{i}].number"),
                format!("duplicate chapter number {}", ch.number),
            ));
        }
    }

    for (i, pair) in chapters.windows(2).enumerate() {
        let (prev, next) = (&pair[0], &pair[1]);
        let field = format!("{prefix}[{}].start", i + 1);
        if next.start == prev.start {
            issues.push(ConfigIssue::error(
                field,
                format!(
                    "duplicate start page {} (chapters {} and {})",
                    next.start, prev.number, next.number
                ),
            ));
        } else if next.start < prev.start {
            issues.push(ConfigIssue::error(
                field,
                format!(
                    "start pages must be ascending: {} follows {}",
                    next.start, prev.start
                ),
            ));
        }
    }

    issues
}

/// Resolve chapters into contiguous ranges; the last one is open-ended.
pub fn resolve_chapters(chapters: &[ChapterConfig]) -> Result<Vec<ChapterRange>> {
    let issues = check_chapters(chapters, "chapters");
    if !issues.is_empty() {
        return Err(FolioError::InvalidConfig(issues));
    }

    let mut ranges = Vec::with_capacity(chapters.len());
    let mut next_start: Option<u32> = None;
    for (i, ch) in chapters.iter().enumerate().rev() {
        let end = match next_start {
            Some(next) if next == 0 || next - 1 < ch.start => {
                return Err(FolioError::InvalidConfig(vec![ConfigIssue::error(
                    format!("chapters[{i}].start"),
                    format!("chapter {} would cover no pages", ch.number),
                )]));
            }
            Some(next) => Some(next - 1),
            None => None,
        };
        ranges.push(ChapterRange {
            number: ch.number,
            title: ch.title.clone(),
            start: ch.start,
            end,
        });
        next_start = Some(ch.start);
    }
    ranges.reverse();
    Ok(ranges)
}

pub fn find_chapter(ranges: &[ChapterRange], page: u32) -> Option<&ChapterRange> {
    ranges.iter().find(|r| r.contains(page))
}
