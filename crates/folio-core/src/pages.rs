//! Page files on disk: discovery, ordering, and page-number parsing.

use crate::error::{FolioError, Result};
use regex::Regex;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "jfif", "webp", "avif", "jxl", "gif", "bmp", "tif", "tiff",
];

fn page_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<any>.*)p(?P<a>\d{1,3})-?(?P<b>\d{1,3})?(?P<anyback>.*)$")
            .expect("static regex")
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFile {
    pub path: PathBuf,
}

impl PageFile {
    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub fn stem(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub fn extension(&self) -> String {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default()
    }
}

/// Image files directly inside `dir`, in natural filename order.
pub fn collect_pages(dir: &Path) -> Result<Vec<PageFile>> {
    if !dir.is_dir() {
        return Err(FolioError::MissingDirectory(dir.to_path_buf()));
    }
    let mut pages = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()));
        if is_image {
            pages.push(PageFile { path });
        }
    }
    pages.sort_by(|a, b| natural_cmp(a.name(), b.name()));
    Ok(pages)
}

/// The pieces of a `...p012-013...` page filename stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageName {
    pub prefix: String,
    pub first: u32,
    pub last: Option<u32>,
    pub suffix: String,
}

impl PageName {
    pub fn parse(stem: &str) -> Option<Self> {
        let caps = page_re().captures(stem)?;
        Some(Self {
            prefix: caps.name("any").map_or("", |m| m.as_str()).to_string(),
            first: caps.name("a")?.as_str().parse().ok()?,
            last: caps.name("b").and_then(|m| m.as_str().parse().ok()),
            suffix: caps.name("anyback").map_or("", |m| m.as_str()).to_string(),
        })
    }

    pub fn is_joined(&self) -> bool {
        self.last.is_some()
    }
}

/// First page number of the last `p<digits>` group in the file stem.
pub fn parse_page_number(filename: &str) -> Result<u32> {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);
    PageName::parse(stem)
        .map(|p| p.first)
        .ok_or_else(|| FolioError::PageParse(filename.to_string()))
}

/// Compare so that `p2` sorts before `p10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();
    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let na = take_digits(&mut ai);
                let nb = take_digits(&mut bi);
                let ta = na.trim_start_matches('0');
                let tb = nb.trim_start_matches('0');
                let ord = ta
                    .len()
                    .cmp(&tb.len())
                    .then_with(|| ta.cmp(tb))
                    .then_with(|| na.len().cmp(&nb.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                let ord = x.to_ascii_lowercase().cmp(&y.to_ascii_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                ai.next();
                bi.next();
            }
        }
    }
}

fn take_digits(it: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut out = String::new();
    while let Some(c) = it.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        out.push(c);
        it.next();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn page_number_from_last_group() {
        assert_eq!(parse_page_number("p012.png").unwrap(), 12);
        assert_eq!(parse_page_number("Title - v01 - p012-013 [dig].jpg").unwrap(), 12);
        assert_eq!(parse_page_number("prologue p3").unwrap(), 3);
        assert!(matches!(
            parse_page_number("cover.png"),
            Err(FolioError::PageParse(_))
        ));
    }

    #[test]
    fn page_name_parts() {
        let name = PageName::parse("Series - v02 - p010-011 [Cover]").unwrap();
        assert_eq!(name.prefix, "Series - v02 - ");
        assert_eq!(name.first, 10);
        assert_eq!(name.last, Some(11));
        assert_eq!(name.suffix, " [Cover]");
        assert!(name.is_joined());
    }

    #[test]
    fn natural_order() {
        let mut names = vec!["p10", "p2", "p1", "P3", "p02"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["p1", "p2", "p02", "P3", "p10"]);
    }

    #[test]
    fn collect_filters_non_images() {
        let dir = TempDir::new().unwrap();
        for name in ["p10.png", "p2.JPG", "notes.txt", "p1.webp"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("p5.png")).unwrap();
        let pages = collect_pages(dir.path()).unwrap();
        let names: Vec<_> = pages.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["p1.webp", "p2.JPG", "p10.png"]);
    }

    #[test]
    fn collect_missing_dir() {
        let dir = TempDir::new().unwrap();
        let err = collect_pages(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, FolioError::MissingDirectory(_)));
    }
}
