//! Per-volume run state and the view rules evaluate against.

use crate::config::{OrchestratorConfig, VolumeConfig};
use crate::effects::Effects;
use crate::error::{FolioError, Result};
use crate::rules::{Lookup, RuleValue};
use crate::skip::SkipActionConfig;
use crate::tools::ToolSet;
use crate::types::Number;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag, set from the signal handler.
pub type CancelFlag = Arc<AtomicBool>;

/// Mutable state threaded through one volume's action sequence.
///
/// Created by the driver before the first action and dropped when the
/// volume finishes. Exactly one action holds it at a time.
pub struct WorkerContext {
    pub root_dir: PathBuf,
    pub current_dir: PathBuf,
    pub tools: Arc<ToolSet>,
    pub effects: Arc<dyn Effects>,
    pub active_skip: Option<SkipActionConfig>,
    pub dry_run: bool,
    pub cancel: CancelFlag,
}

impl WorkerContext {
    pub fn new(
        root_dir: impl Into<PathBuf>,
        current_dir: impl Into<PathBuf>,
        tools: Arc<ToolSet>,
        effects: Arc<dyn Effects>,
    ) -> Self {
        Self {
            root_dir: root_dir.into(),
            current_dir: current_dir.into(),
            tools,
            effects,
            active_skip: None,
            dry_run: false,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn update_cwd(&mut self, dir: impl Into<PathBuf>) {
        self.current_dir = dir.into();
        tracing::debug!(cwd = %self.current_dir.display(), "current directory updated");
    }

    /// Replace the active skip policy. `None` clears it.
    pub fn set_skip(&mut self, skip: Option<SkipActionConfig>) {
        self.active_skip = skip;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(FolioError::Cancelled);
        }
        Ok(())
    }

    /// `root / base_path / volume.path`, the tree an emitting action writes to.
    pub fn output_dir(&self, base_path: &Path, volume: &VolumeConfig) -> PathBuf {
        self.root_dir.join(base_path).join(&volume.path)
    }
}

// ---------------------------------------------------------------------------
// RuleContext
// ---------------------------------------------------------------------------

/// Read-only fields a `conditions` rule can reference for one volume.
pub struct RuleContext<'a> {
    pub config: &'a OrchestratorConfig,
    pub volume: &'a VolumeConfig,
    pub dry_run: bool,
}

impl<'a> RuleContext<'a> {
    pub fn new(config: &'a OrchestratorConfig, volume: &'a VolumeConfig, dry_run: bool) -> Self {
        Self {
            config,
            volume,
            dry_run,
        }
    }

    fn fixed(&self, field: &str) -> Option<RuleValue> {
        let cfg = self.config;
        let vol = self.volume;
        let value = match field {
            "title" => RuleValue::from(cfg.title.as_str()),
            "publisher" => RuleValue::from(cfg.publisher.as_str()),
            "credit" => RuleValue::from(cfg.credit.as_str()),
            "email" => RuleValue::from(cfg.email.as_str()),
            "bracket_type" => RuleValue::from(cfg.bracket_type.as_str()),
            "base_path" => RuleValue::from(cfg.base_path.to_string_lossy().into_owned()),
            "volume" => match vol.number {
                Number::Int(i) => RuleValue::from(i),
                Number::Decimal(f) => RuleValue::from(f),
            },
            "path" => RuleValue::from(vol.path.to_string_lossy().into_owned()),
            "year" => RuleValue::from(vol.year),
            "oneshot" => RuleValue::from(vol.oneshot),
            "revision" => RuleValue::from(vol.revision),
            "quality" => RuleValue::from(vol.quality?.to_string()),
            "pub_type" => RuleValue::from(vol.pub_type.as_str()),
            "extra_text" => RuleValue::from(vol.extra_text.clone()?),
            "chapters" => RuleValue::Int(vol.chapters.len() as i64),
            "colors" => RuleValue::List(vol.colors.iter().map(|p| RuleValue::from(*p)).collect()),
            "spreads" => RuleValue::Int(vol.spreads.len() as i64),
            "dry_run" => RuleValue::from(self.dry_run),
            _ => return None,
        };
        Some(value)
    }
}

/// Names answered by [`RuleContext`] before the variable maps are consulted.
pub const FIXED_FIELDS: &[&str] = &[
    "title",
    "publisher",
    "credit",
    "email",
    "bracket_type",
    "base_path",
    "volume",
    "path",
    "year",
    "oneshot",
    "revision",
    "quality",
    "pub_type",
    "extra_text",
    "chapters",
    "colors",
    "spreads",
    "dry_run",
];

impl Lookup for RuleContext<'_> {
    fn lookup(&self, field: &str) -> Option<RuleValue> {
        if FIXED_FIELDS.contains(&field) {
            return self.fixed(field);
        }
        self.volume
            .variables
            .get(field)
            .or_else(|| self.config.variables.get(field))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Operator, RuleExpr};
    use crate::types::{BracketStyle, Quality};

    fn config() -> OrchestratorConfig {
        let mut cfg = OrchestratorConfig::template("T", "P", "C", "e@x", BracketStyle::Round);
        cfg.variables.insert("lane".into(), "fast".into());
        cfg.variables.insert("title".into(), "shadowed".into());
        cfg.volumes[0].variables.insert("lane".into(), "slow".into());
        cfg
    }

    #[test]
    fn fixed_fields_resolve() {
        let cfg = config();
        let ctx = RuleContext::new(&cfg, &cfg.volumes[0], true);
        assert_eq!(ctx.lookup("volume"), Some(RuleValue::Int(1)));
        assert_eq!(ctx.lookup("dry_run"), Some(RuleValue::Bool(true)));
        assert_eq!(ctx.lookup("pub_type"), Some(RuleValue::from("digital")));
        assert_eq!(ctx.lookup("quality"), None);
    }

    #[test]
    fn volume_variables_override_orchestrator() {
        let cfg = config();
        let ctx = RuleContext::new(&cfg, &cfg.volumes[0], false);
        assert_eq!(ctx.lookup("lane"), Some(RuleValue::from("slow")));
        assert_eq!(ctx.lookup("title"), Some(RuleValue::from("T")));
        assert_eq!(ctx.lookup("unknown"), None);
    }

    #[test]
    fn missing_quality_fails_closed() {
        let mut cfg = config();
        let rule = RuleExpr::condition("quality", Operator::Eq, "HQ");
        assert!(!rule.evaluate(&RuleContext::new(&cfg, &cfg.volumes[0], false)));
        cfg.volumes[0].quality = Some(Quality::Hq);
        assert!(rule.evaluate(&RuleContext::new(&cfg, &cfg.volumes[0], false)));
    }
}
