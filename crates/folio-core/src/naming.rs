//! Catalog naming convention for pages and archives.
//!
//! Pages:    `{title} - c{ch}{chex} ({vol}) - p{pg}{extra}{pub} [{chapter title}] [{publisher}] [{credit}]`
//! Archives: `{title} {vol} ({year}) {extra}({pub}) {open}{credit}{close}`

use crate::chapters::ChapterRange;
use crate::types::{BracketStyle, Number, PublicationType, Quality};

/// Zero-padded number; decimals become `{base}{sep}{fraction}`.
///
/// With `shift_split`, single-digit fractions of 5 and above are shifted down
/// by 4 so that `.5` reads as split part 1.
pub fn format_numbering(number: Number, digits: usize, shift_split: bool, sep: &str) -> String {
    match number {
        Number::Int(i) => format!("{i:0digits$}"),
        Number::Decimal(_) => {
            let fraction = match number.split_part() {
                Some(part) if shift_split => part.to_string(),
                _ => number.floating().unwrap_or_default(),
            };
            format!("{:0digits$}{sep}{fraction}", number.base())
        }
    }
}

/// `v01`, `v01.5`.
pub fn volume_text(number: Number) -> String {
    format!("v{}", format_numbering(number, 2, false, "."))
}

pub struct ArchiveName<'a> {
    pub title: &'a str,
    pub year: u32,
    pub publication: PublicationType,
    pub credit: &'a str,
    pub bracket: BracketStyle,
    pub volume_text: Option<String>,
    pub extra: Option<&'a str>,
    pub revision: u32,
}

impl ArchiveName<'_> {
    pub fn format(&self) -> String {
        let (open, close) = self.bracket.pair();
        let vol = self
            .volume_text
            .as_deref()
            .map(|v| format!(" {v}"))
            .unwrap_or_default();
        let extra = self
            .extra
            .map(|e| format!("({}) ", e.trim()))
            .unwrap_or_default();
        let mut name = format!(
            "{}{vol} ({}) {extra}({}) {open}{}{close}",
            self.title,
            self.year,
            self.publication.archive_tag(),
            self.credit,
        );
        if self.revision > 1 {
            name.push_str(&format!(" (v{})", self.revision));
        }
        name
    }
}

pub struct PageNaming<'a> {
    pub title: &'a str,
    pub publisher: &'a str,
    pub chapter: &'a ChapterRange,
    /// Every chapter that shares `chapter`'s integer part, including itself.
    pub siblings: &'a [&'a ChapterRange],
    /// `012` or `012-013`.
    pub page: &'a str,
    pub publication: PublicationType,
    pub credit: &'a str,
    pub volume: Option<Number>,
    pub extra: Option<&'a str>,
    pub quality: Option<Quality>,
    pub revision: u32,
}

impl PageNaming<'_> {
    fn chapter_label(&self) -> (String, String) {
        let base = self.chapter.number.base();
        let mut num = format!("{base:03}");
        let mut extra = String::new();
        let Some(fraction) = self.chapter.number.floating() else {
            return (num, extra);
        };

        let mut group: Vec<&ChapterRange> = self.siblings.to_vec();
        group.sort_by(|a, b| a.number.partial_cmp(&b.number).unwrap_or(std::cmp::Ordering::Equal));

        if group.len() > 1 {
            let all_split = group
                .iter()
                .all(|c| c.number.floating().is_none() || c.number.split_part().is_some());
            match self.chapter.number.split_part() {
                Some(part) if all_split => num.push_str(&format!("x{part}")),
                _ => {
                    let idx = group
                        .iter()
                        .position(|c| c.number == self.chapter.number)
                        .unwrap_or(0);
                    extra = format!(" (c{num}.{fraction})");
                    num.push_str(&format!("x{}", idx + 1));
                }
            }
        } else if let Some(part) = self.chapter.number.split_part() {
            num.push_str(&format!("x{part}"));
        } else {
            extra = format!(" (c{num}.{fraction})");
            num.push_str("x1");
        }
        (num, extra)
    }

    /// Filename stem (no extension).
    pub fn format(&self) -> String {
        let (ch, chex) = self.chapter_label();
        let vol = match self.volume {
            Some(v) => format!("v{}", format_numbering(v, 2, true, "x")),
            None => "OShot".to_string(),
        };

        let tag = self.publication.image_tag();
        let mut pub_type = if tag.is_empty() {
            String::new()
        } else {
            format!("[{tag}]")
        };
        let mut extra = match self.extra {
            Some(e) => format!(" [{e}]"),
            None => " ".to_string(),
        };
        let has_extra = !extra.trim().is_empty();
        if pub_type.is_empty() && !has_extra {
            extra.clear();
        } else if !pub_type.is_empty() && has_extra {
            pub_type.insert(0, ' ');
        }

        let publisher = if self.publisher.is_empty() {
            "Unknown Publisher"
        } else {
            self.publisher
        };
        let chapter_title = self
            .chapter
            .title
            .as_deref()
            .map(|t| format!(" [{t}]"))
            .unwrap_or_default();

        let mut name = format!(
            "{} - c{ch}{chex} ({vol}) - p{}{extra}{pub_type}{chapter_title} [{publisher}] [{}]",
            self.title, self.page, self.credit
        );
        if let Some(q) = self.quality {
            name.push_str(&format!(" {{{q}}}"));
        }
        if self.revision > 1 {
            name.push_str(&format!(" {{r{}}}", self.revision));
        }
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(number: Number, title: Option<&str>) -> ChapterRange {
        ChapterRange {
            number,
            title: title.map(String::from),
            start: 0,
            end: None,
        }
    }

    fn naming<'a>(ch: &'a ChapterRange, siblings: &'a [&'a ChapterRange]) -> PageNaming<'a> {
        PageNaming {
            title: "Series",
            publisher: "Press",
            chapter: ch,
            siblings,
            page: "005",
            publication: PublicationType::Digital,
            credit: "Ripper",
            volume: Some(Number::Int(1)),
            extra: None,
            quality: None,
            revision: 1,
        }
    }

    #[test]
    fn plain_page_name() {
        let ch = chapter(Number::Int(3), None);
        let n = naming(&ch, &[]);
        assert_eq!(n.format(), "Series - c003 (v01) - p005 [dig] [Press] [Ripper]");
    }

    #[test]
    fn titled_and_tagged_page_name() {
        let ch = chapter(Number::Int(3), Some("Start"));
        let mut n = naming(&ch, &[]);
        n.extra = Some("Cover");
        n.quality = Some(Quality::Hq);
        n.revision = 2;
        assert_eq!(
            n.format(),
            "Series - c003 (v01) - p005 [Cover] [dig] [Start] [Press] [Ripper] {HQ} {r2}"
        );
    }

    #[test]
    fn no_publication_tag() {
        let ch = chapter(Number::Int(1), None);
        let mut n = naming(&ch, &[]);
        n.publication = PublicationType::None;
        n.volume = None;
        assert_eq!(n.format(), "Series - c001 (OShot) - p005 [Press] [Ripper]");
    }

    #[test]
    fn split_chapter_suffixes() {
        let half = chapter(Number::Decimal(10.5), None);
        assert_eq!(naming(&half, &[&half]).chapter_label(), ("010x1".into(), String::new()));

        let part = chapter(Number::Decimal(10.1), None);
        let whole = chapter(Number::Int(10), None);
        let second = chapter(Number::Decimal(10.2), None);
        let group = [&whole, &part, &second];
        assert_eq!(
            naming(&second, &group).chapter_label(),
            ("010x3".into(), " (c010.2)".into())
        );
        assert_eq!(naming(&whole, &group).chapter_label(), ("010".into(), String::new()));

        let narrow = chapter(Number::Decimal(10.05), None);
        assert_eq!(
            naming(&narrow, &[&narrow]).chapter_label(),
            ("010x1".into(), " (c010.05)".into())
        );
    }

    #[test]
    fn archive_name() {
        let name = ArchiveName {
            title: "Series",
            year: 2021,
            publication: PublicationType::Digital,
            credit: "Ripper",
            bracket: BracketStyle::Square,
            volume_text: Some(volume_text(Number::Int(3))),
            extra: Some("Omnibus"),
            revision: 2,
        };
        assert_eq!(name.format(), "Series v03 (2021) (Omnibus) (Digital) [Ripper] (v2)");
    }

    #[test]
    fn numbering() {
        assert_eq!(format_numbering(Number::Int(7), 3, true, "x"), "007");
        assert_eq!(format_numbering(Number::Decimal(7.5), 2, true, "x"), "07x1");
        assert_eq!(format_numbering(Number::Decimal(7.5), 2, false, "."), "07.5");
        assert_eq!(format_numbering(Number::Decimal(7.05), 2, true, "x"), "07x05");
        assert_eq!(volume_text(Number::Decimal(10.05)), "v10.05");
        assert_eq!(volume_text(Number::Decimal(10.5)), "v10.5");
    }
}
