use crate::actions::{ActionKind, ActionStep};
use crate::chapters::{self, ChapterConfig, ChapterRange};
use crate::error::{FolioError, Result};
use crate::rules::RuleValue;
use crate::skip::{self, SkipActionConfig};
use crate::types::{BracketStyle, Number, PublicationType, Quality};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigIssue / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigIssue {
    pub level: WarnLevel,
    /// Path of the offending field, e.g. `volumes[1].chapters[2].start`.
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigIssue {
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == WarnLevel::Error
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            WarnLevel::Warning => "warning",
            WarnLevel::Error => "error",
        };
        write!(f, "{level}: {}: {}", self.field, self.message)
    }
}

// ---------------------------------------------------------------------------
// MetaNaming
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageSpec {
    One(u32),
    Many(Vec<u32>),
}

impl PageSpec {
    pub fn pages(&self) -> &[u32] {
        match self {
            PageSpec::One(p) => std::slice::from_ref(p),
            PageSpec::Many(v) => v,
        }
    }
}

/// Extra filename tag for specific pages, e.g. `[Cover]` or `[ToC]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetaNaming {
    pub tag: String,
    pub page: PageSpec,
}

// ---------------------------------------------------------------------------
// VolumeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeConfig {
    pub path: PathBuf,
    pub number: Number,
    #[serde(default = "current_year")]
    pub year: u32,
    #[serde(default)]
    pub oneshot: bool,
    /// Inclusive `[first, last]` page pairs to be joined.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spreads: Vec<[u32; 2]>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub colors: BTreeSet<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta_naming: Vec<MetaNaming>,
    #[serde(default)]
    pub chapters: Vec<ChapterConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_text: Option<String>,
    #[serde(default = "default_revision")]
    pub revision: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,
    #[serde(default)]
    pub pub_type: PublicationType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_actions: Vec<SkipActionConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, RuleValue>,
}

/// Current year in Japan Standard Time.
pub fn current_year() -> u32 {
    let now = chrono::Utc::now();
    let year = match chrono::FixedOffset::east_opt(9 * 3600) {
        Some(jst) => now.with_timezone(&jst).year(),
        None => now.year(),
    };
    u32::try_from(year).unwrap_or(2000)
}

fn default_revision() -> u32 {
    1
}

impl VolumeConfig {
    pub fn new(number: Number, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            number,
            year: current_year(),
            oneshot: false,
            spreads: Vec::new(),
            colors: BTreeSet::new(),
            meta_naming: Vec::new(),
            chapters: Vec::new(),
            extra_text: None,
            revision: default_revision(),
            quality: None,
            pub_type: PublicationType::default(),
            skip_actions: Vec::new(),
            variables: BTreeMap::new(),
        }
    }

    pub fn chapter_ranges(&self) -> Result<Vec<ChapterRange>> {
        chapters::resolve_chapters(&self.chapters)
    }

    pub fn meta_name_map(&self) -> BTreeMap<u32, &str> {
        let mut map = BTreeMap::new();
        for meta in &self.meta_naming {
            for page in meta.page.pages() {
                map.insert(*page, meta.tag.as_str());
            }
        }
        map
    }

    pub fn is_color(&self, page: u32) -> bool {
        self.colors.contains(&page)
    }

    fn validate(&self, prefix: &str, steps: &BTreeMap<String, bool>) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.path.as_os_str().is_empty() {
            issues.push(ConfigIssue::error(format!("{prefix}.path"), "path must not be empty"));
        }
        if self.number.is_negative() {
            issues.push(ConfigIssue::error(
                format!("{prefix}.number"),
                format!("volume number {} must not be negative", self.number),
            ));
        }
        if !(1000..=9999).contains(&self.year) {
            issues.push(ConfigIssue::error(
                format!("{prefix}.year"),
                format!("year {} must be within 1000..=9999", self.year),
            ));
        }
        if self.revision < 1 {
            issues.push(ConfigIssue::error(format!("{prefix}.revision"), "revision must be at least 1"));
        }
        for (i, [first, last]) in self.spreads.iter().enumerate() {
            if first > last {
                issues.push(ConfigIssue::error(
                    format!("{prefix}.spreads[{i}]"),
                    format!("spread start {first} is after its end {last}"),
                ));
            }
        }

        let mut tagged = BTreeSet::new();
        for (i, meta) in self.meta_naming.iter().enumerate() {
            for page in meta.page.pages() {
                if !tagged.insert(*page) {
                    issues.push(ConfigIssue::error(
                        format!("{prefix}.meta_naming[{i}].page"),
                        format!("page {page} already has a metadata tag"),
                    ));
                }
            }
        }

        issues.extend(chapters::check_chapters(
            &self.chapters,
            &format!("{prefix}.chapters"),
        ));
        issues.extend(skip::check_skip_actions(
            &self.skip_actions,
            steps,
            &format!("{prefix}.skip_actions"),
        ));
        issues
    }
}

// ---------------------------------------------------------------------------
// OrchestratorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub title: String,
    pub publisher: String,
    pub credit: String,
    pub email: String,
    #[serde(default)]
    pub bracket_type: BracketStyle,
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
    #[serde(default)]
    pub volumes: Vec<VolumeConfig>,
    #[serde(default)]
    pub actions: Vec<ActionStep>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, RuleValue>,
}

fn default_base_path() -> PathBuf {
    PathBuf::from("source")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Json,
}

impl Format {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Yaml,
        }
    }
}

impl OrchestratorConfig {
    /// Starter config: one volume and a shift-rename followed by a rename.
    pub fn template(
        title: impl Into<String>,
        publisher: impl Into<String>,
        credit: impl Into<String>,
        email: impl Into<String>,
        bracket_type: BracketStyle,
    ) -> Self {
        Self {
            title: title.into(),
            publisher: publisher.into(),
            credit: credit.into(),
            email: email.into(),
            bracket_type,
            base_path: default_base_path(),
            volumes: vec![VolumeConfig::new(Number::Int(1), "v01")],
            actions: vec![
                ActionStep::new(crate::actions::Action::ShiftRename(Default::default())),
                ActionStep::new(crate::actions::Action::Rename(Default::default())),
            ],
            variables: BTreeMap::new(),
        }
    }

    /// Parse without validating.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(FolioError::ConfigNotFound(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        let cfg = match Format::of(path) {
            Format::Json => serde_json::from_str(&data)?,
            Format::Yaml => serde_yaml::from_str(&data)?,
        };
        Ok(cfg)
    }

    /// Parse and reject on any validation error. Warnings are logged.
    pub fn load(path: &Path) -> Result<Self> {
        let cfg = Self::read(path)?;
        let (errors, warnings): (Vec<_>, Vec<_>) =
            cfg.validate().into_iter().partition(ConfigIssue::is_error);
        for w in &warnings {
            tracing::warn!(field = %w.field, "{}", w.message);
        }
        if !errors.is_empty() {
            return Err(FolioError::InvalidConfig(errors));
        }
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = match Format::of(path) {
            Format::Json => {
                let mut s = serde_json::to_string_pretty(self)?;
                s.push('\n');
                s
            }
            Format::Yaml => serde_yaml::to_string(self)?,
        };
        crate::io::atomic_write(path, data.as_bytes())
    }

    /// Write a fresh config, refusing to replace an existing file.
    pub fn create(&self, path: &Path) -> Result<()> {
        if path.exists() {
            return Err(FolioError::ConfigExists(path.to_path_buf()));
        }
        self.save(path)
    }

    /// Instance names in action order: `{kind}-{n}` with `n` counted per kind.
    pub fn action_names(&self) -> Vec<String> {
        let mut counters: BTreeMap<ActionKind, usize> = BTreeMap::new();
        self.actions
            .iter()
            .map(|step| {
                let kind = step.kind();
                let n = counters.entry(kind).or_insert(0);
                *n += 1;
                format!("{kind}-{n}")
            })
            .collect()
    }

    /// `(instance name, step)` pairs in order.
    pub fn named_actions(&self) -> Vec<(String, &ActionStep)> {
        self.action_names().into_iter().zip(self.actions.iter()).collect()
    }

    pub fn volume(&self, number: Number) -> Option<&VolumeConfig> {
        self.volumes.iter().find(|v| v.number == number)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        for (field, value) in [
            ("title", &self.title),
            ("credit", &self.credit),
        ] {
            if value.trim().is_empty() {
                issues.push(ConfigIssue::error(field, format!("{field} must not be empty")));
            }
        }
        if self.publisher.trim().is_empty() {
            issues.push(ConfigIssue::warning("publisher", "publisher is empty"));
        }

        if self.volumes.is_empty() {
            issues.push(ConfigIssue::error("volumes", "at least one volume is required"));
        }
        if self.actions.is_empty() {
            issues.push(ConfigIssue::error("actions", "at least one action is required"));
        }

        let steps: BTreeMap<String, bool> = self
            .named_actions()
            .into_iter()
            .map(|(name, step)| (name, step.kind().is_page_scoped()))
            .collect();

        for (i, vol) in self.volumes.iter().enumerate() {
            if self.volumes[..i].iter().any(|prev| prev.number == vol.number) {
                issues.push(ConfigIssue::error(
                    format!("volumes[{i}].number"),
                    format!("duplicate volume number {}", vol.number),
                ));
            }
            issues.extend(vol.validate(&format!("volumes[{i}]"), &steps));
        }

        for (i, step) in self.actions.iter().enumerate() {
            issues.extend(step.validate(&format!("actions[{i}]")));
        }

        issues
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Action;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
title: Sample Series
publisher: Example Press
credit: Ripper
email: ripper@example.com
volumes:
  - path: v01
    number: 1
    year: 2021
    colors: [0, 1]
    chapters:
      - number: 1
        start: 0
      - number: 2
        title: Second
        start: 10
    skip_actions:
      - action: copy
        step: optimize-1
        pages: [10, 11]
actions:
  - kind: denoise
  - kind: autolevel
  - kind: autolevel
    conditions:
      op: condition
      field: volume
      operator: ">="
      value: 2
  - kind: optimize
  - kind: pack
"#;

    fn sample() -> OrchestratorConfig {
        serde_yaml::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn defaults_applied() {
        let cfg = sample();
        assert_eq!(cfg.bracket_type, BracketStyle::Round);
        assert_eq!(cfg.base_path, PathBuf::from("source"));
        let vol = &cfg.volumes[0];
        assert_eq!(vol.revision, 1);
        assert_eq!(vol.pub_type, PublicationType::Digital);
        assert!(vol.quality.is_none());
    }

    #[test]
    fn instance_names_count_per_kind() {
        let cfg = sample();
        assert_eq!(
            cfg.action_names(),
            vec!["denoise-1", "autolevel-1", "autolevel-2", "optimize-1", "pack-1"]
        );
    }

    #[test]
    fn repeated_kind_numbers_only_its_own_instances() {
        let mut cfg = sample();
        cfg.actions.retain(|step| step.kind() != ActionKind::Optimize);
        assert_eq!(
            cfg.action_names(),
            vec!["denoise-1", "autolevel-1", "autolevel-2", "pack-1"]
        );
    }

    #[test]
    fn sample_is_valid() {
        let issues = sample().validate();
        assert!(issues.iter().all(|i| !i.is_error()), "{issues:?}");
    }

    #[test]
    fn unknown_skip_step_rejected() {
        let mut cfg = sample();
        cfg.volumes[0].skip_actions[0].step = "autolevel-9".to_string();
        let errors: Vec<_> = cfg.validate().into_iter().filter(|i| i.is_error()).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "volumes[0].skip_actions[0].step");
    }

    #[test]
    fn every_violation_collected() {
        let mut cfg = sample();
        let mut dup = cfg.volumes[0].clone();
        dup.year = 99;
        dup.chapters[1].start = 0;
        dup.skip_actions.clear();
        cfg.volumes.push(dup);
        let errors: Vec<_> = cfg.validate().into_iter().filter(|i| i.is_error()).collect();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"volumes[1].number"));
        assert!(fields.contains(&"volumes[1].year"));
        assert!(fields.contains(&"volumes[1].chapters[1].start"));
    }

    #[test]
    fn duplicate_meta_naming_page() {
        let mut cfg = sample();
        cfg.volumes[0].meta_naming = vec![
            MetaNaming {
                tag: "Cover".into(),
                page: PageSpec::One(0),
            },
            MetaNaming {
                tag: "ToC".into(),
                page: PageSpec::Many(vec![2, 0]),
            },
        ];
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.field == "volumes[0].meta_naming[1].page" && i.is_error()));
    }

    #[test]
    fn load_rejects_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("folio.yaml");
        let mut cfg = sample();
        cfg.actions.clear();
        cfg.save(&path).unwrap();
        match OrchestratorConfig::load(&path) {
            Err(FolioError::InvalidConfig(issues)) => {
                assert!(issues.iter().any(|i| i.field == "actions"));
            }
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = OrchestratorConfig::load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, FolioError::ConfigNotFound(_)));
    }

    #[test]
    fn json_and_yaml_persist_alike() {
        let dir = TempDir::new().unwrap();
        let cfg = sample();
        for name in ["a.json", "a.yaml"] {
            let path = dir.path().join(name);
            cfg.save(&path).unwrap();
            let back = OrchestratorConfig::load(&path).unwrap();
            assert_eq!(back.action_names(), cfg.action_names());
            assert_eq!(back.volumes[0].chapters, cfg.volumes[0].chapters);
        }
        let json = std::fs::read_to_string(dir.path().join("a.json")).unwrap();
        assert!(json.trim_start().starts_with('{'));
    }

    #[test]
    fn create_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("folio.yaml");
        let cfg = OrchestratorConfig::template("T", "P", "C", "e@x", BracketStyle::Square);
        cfg.create(&path).unwrap();
        let err = cfg.create(&path).unwrap_err();
        assert!(matches!(err, FolioError::ConfigExists(_)));
    }

    #[test]
    fn template_is_valid() {
        let cfg = OrchestratorConfig::template("T", "P", "C", "e@x", BracketStyle::Round);
        assert!(cfg.validate().iter().all(|i| !i.is_error()));
        assert_eq!(cfg.action_names(), vec!["shift_rename-1", "rename-1"]);
        assert!(matches!(cfg.actions[0].action, Action::ShiftRename(_)));
    }

    #[test]
    fn meta_name_map_expands_lists() {
        let mut vol = VolumeConfig::new(Number::Int(1), "v01");
        vol.meta_naming.push(MetaNaming {
            tag: "Cover".into(),
            page: PageSpec::Many(vec![0, 1]),
        });
        let map = vol.meta_name_map();
        assert_eq!(map.get(&1), Some(&"Cover"));
        assert_eq!(map.len(), 2);
    }
}
