//! Page-scoped pixel transforms: each writes one output file per input page.

use super::pagewise::{preview, run_batch, PageBatch};
use super::{check_range, check_threads, default_threads, ActionReport, PageResult, Step};
use crate::config::{ConfigIssue, OrchestratorConfig, VolumeConfig};
use crate::context::WorkerContext;
use crate::effects::Backend;
use crate::error::Result;
use crate::skip::{self, SkipMode};
use crate::tools::{ToolKind, ToolRequirements};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

fn binary(name: &str) -> ToolRequirements {
    ToolRequirements::from([(name.to_string(), ToolKind::Binary)])
}

fn magick_or_image(native: bool) -> ToolRequirements {
    if native {
        ToolRequirements::from([("image".to_string(), ToolKind::Package)])
    } else {
        binary("magick")
    }
}

/// The `magick` binary, or `None` when the in-process backend runs instead.
pub(super) fn magick_backend(ctx: &WorkerContext, native: bool) -> Result<Option<PathBuf>> {
    if native {
        ctx.tools.package("image")?;
        Ok(None)
    } else {
        Ok(Some(ctx.tools.binary("magick")?.to_path_buf()))
    }
}

fn check_tile_size(issues: &mut Vec<ConfigIssue>, prefix: &str, tile_size: u32) {
    if tile_size != 0 && tile_size < 32 {
        issues.push(ConfigIssue::error(
            format!("{prefix}.tile_size"),
            format!("tile size {tile_size} must be at least 32, or 0 for auto"),
        ));
    }
}

// ---------------------------------------------------------------------------
// Denoise / upscale
// ---------------------------------------------------------------------------

fn default_denoise_path() -> PathBuf {
    PathBuf::from("denoised")
}

fn default_upscale_path() -> PathBuf {
    PathBuf::from("upscaled")
}

fn default_model() -> String {
    "models-cunet".to_string()
}

fn default_tile_size() -> u32 {
    128
}

fn default_denoise_level() -> i32 {
    2
}

fn default_upscale_noise() -> i32 {
    -1
}

fn default_scale() -> u32 {
    2
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenoiseAction {
    #[serde(default = "default_denoise_path")]
    pub base_path: PathBuf,
    /// waifu2x model directory.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub device_id: i32,
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
    #[serde(default = "default_denoise_level")]
    pub noise_level: i32,
    #[serde(default = "default_threads")]
    pub threads: usize,
}

impl Step for DenoiseAction {
    fn run(
        &self,
        ctx: &mut WorkerContext,
        volume: &VolumeConfig,
        _config: &OrchestratorConfig,
    ) -> Result<ActionReport> {
        let out_dir = ctx.output_dir(&self.base_path, volume);
        if ctx.dry_run {
            return Ok(preview(ctx, "denoise", out_dir, self));
        }
        let waifu2x = ctx.tools.binary("waifu2x")?.to_path_buf();
        let effects = Arc::clone(&ctx.effects);
        let source = ctx.current_dir.clone();
        let batch = PageBatch {
            label: "denoise",
            source_dir: &source,
            out_dir: &out_dir,
            threads: self.threads,
            needs_colors: false,
            dest_ext: Some("png"),
            only_pages: None,
        };
        let report = run_batch(ctx, volume, batch, |job| {
            effects.denoise(&waifu2x, &job.src, &job.dest, self)?;
            Ok(PageResult::Processed)
        })?;
        ctx.update_cwd(out_dir);
        Ok(report)
    }

    fn required_tools(&self) -> ToolRequirements {
        binary("waifu2x")
    }

    fn validate(&self, prefix: &str, issues: &mut Vec<ConfigIssue>) {
        check_range(issues, format!("{prefix}.noise_level"), self.noise_level, -1, 3);
        check_tile_size(issues, prefix, self.tile_size);
        check_threads(issues, prefix, self.threads);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpscaleAction {
    #[serde(default = "default_upscale_path")]
    pub base_path: PathBuf,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub device_id: i32,
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
    #[serde(default = "default_scale")]
    pub scale: u32,
    #[serde(default = "default_upscale_noise")]
    pub noise_level: i32,
    #[serde(default = "default_threads")]
    pub threads: usize,
}

const UPSCALE_FACTORS: &[u32] = &[1, 2, 4, 8, 16, 32];

impl Step for UpscaleAction {
    fn run(
        &self,
        ctx: &mut WorkerContext,
        volume: &VolumeConfig,
        _config: &OrchestratorConfig,
    ) -> Result<ActionReport> {
        let out_dir = ctx.output_dir(&self.base_path, volume);
        if ctx.dry_run {
            return Ok(preview(ctx, "upscale", out_dir, self));
        }
        let waifu2x = ctx.tools.binary("waifu2x")?.to_path_buf();
        let effects = Arc::clone(&ctx.effects);
        let source = ctx.current_dir.clone();
        let batch = PageBatch {
            label: "upscale",
            source_dir: &source,
            out_dir: &out_dir,
            threads: self.threads,
            needs_colors: false,
            dest_ext: Some("png"),
            only_pages: None,
        };
        let report = run_batch(ctx, volume, batch, |job| {
            effects.upscale(&waifu2x, &job.src, &job.dest, self)?;
            Ok(PageResult::Processed)
        })?;
        ctx.update_cwd(out_dir);
        Ok(report)
    }

    fn required_tools(&self) -> ToolRequirements {
        binary("waifu2x")
    }

    fn validate(&self, prefix: &str, issues: &mut Vec<ConfigIssue>) {
        if !UPSCALE_FACTORS.contains(&self.scale) {
            issues.push(ConfigIssue::error(
                format!("{prefix}.scale"),
                format!("scale {} must be one of 1, 2, 4, 8, 16, 32", self.scale),
            ));
        }
        check_range(issues, format!("{prefix}.noise_level"), self.noise_level, -1, 3);
        check_tile_size(issues, prefix, self.tile_size);
        check_threads(issues, prefix, self.threads);
    }
}

// ---------------------------------------------------------------------------
// Rescale
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RescaleTarget {
    Exact { width: u32, height: u32 },
    Width { width: u32 },
    Height { height: u32 },
    /// Largest size within the box that keeps the aspect ratio.
    Fit { width: u32, height: u32 },
    Multiply { factor: f64 },
}

impl RescaleTarget {
    fn validate(&self, field: &str, issues: &mut Vec<ConfigIssue>) {
        let dims = match *self {
            RescaleTarget::Exact { width, height } | RescaleTarget::Fit { width, height } => {
                vec![("width", width), ("height", height)]
            }
            RescaleTarget::Width { width } => vec![("width", width)],
            RescaleTarget::Height { height } => vec![("height", height)],
            RescaleTarget::Multiply { factor } => {
                if !(factor > 0.0 && factor.is_finite()) {
                    issues.push(ConfigIssue::error(
                        format!("{field}.factor"),
                        format!("factor {factor} must be greater than 0"),
                    ));
                }
                Vec::new()
            }
        };
        for (name, value) in dims {
            if value == 0 {
                issues.push(ConfigIssue::error(
                    format!("{field}.{name}"),
                    format!("{name} must be at least 1"),
                ));
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeKernel {
    Nearest,
    Box,
    Bicubic,
    Bilinear,
    CatmullRom,
    Mitchell,
    Gaussian,
    #[default]
    Lanczos,
    Hamming,
}

fn default_rescale_path() -> PathBuf {
    PathBuf::from("rescaled")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescaleAction {
    #[serde(default = "default_rescale_path")]
    pub base_path: PathBuf,
    pub rescale: RescaleTarget,
    #[serde(default)]
    pub kernel: ResizeKernel,
    /// Resize in-process instead of through `magick`.
    #[serde(default)]
    pub native: bool,
    #[serde(default = "default_threads")]
    pub threads: usize,
}

impl Step for RescaleAction {
    fn run(
        &self,
        ctx: &mut WorkerContext,
        volume: &VolumeConfig,
        _config: &OrchestratorConfig,
    ) -> Result<ActionReport> {
        let out_dir = ctx.output_dir(&self.base_path, volume);
        if ctx.dry_run {
            return Ok(preview(ctx, "rescale", out_dir, self));
        }
        let magick = magick_backend(ctx, self.native)?;
        let effects = Arc::clone(&ctx.effects);
        let source = ctx.current_dir.clone();
        let batch = PageBatch {
            label: "rescale",
            source_dir: &source,
            out_dir: &out_dir,
            threads: self.threads,
            needs_colors: false,
            dest_ext: Some("png"),
            only_pages: None,
        };
        let report = run_batch(ctx, volume, batch, |job| {
            let backend = magick.as_deref().map_or(Backend::Native, Backend::Binary);
            effects.rescale(backend, &job.src, &job.dest, &self.rescale, self.kernel)?;
            Ok(PageResult::Processed)
        })?;
        ctx.update_cwd(out_dir);
        Ok(report)
    }

    fn required_tools(&self) -> ToolRequirements {
        magick_or_image(self.native)
    }

    fn validate(&self, prefix: &str, issues: &mut Vec<ConfigIssue>) {
        self.rescale.validate(&format!("{prefix}.rescale"), issues);
        check_threads(issues, prefix, self.threads);
    }
}

// ---------------------------------------------------------------------------
// Autolevel
// ---------------------------------------------------------------------------

fn default_leveled_path() -> PathBuf {
    PathBuf::from("leveled")
}

fn default_upper_limit() -> u32 {
    60
}

fn default_min_peak_pct() -> f64 {
    0.25
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutolevelAction {
    #[serde(default = "default_leveled_path")]
    pub base_path: PathBuf,
    /// Highest histogram bin considered for the black point.
    #[serde(default = "default_upper_limit")]
    pub upper_limit: u32,
    #[serde(default)]
    pub peak_offset: i32,
    /// Share of pixels, in percent, a bin needs to count as a peak.
    #[serde(default = "default_min_peak_pct")]
    pub min_peak_pct: f64,
    #[serde(default = "default_true")]
    pub skip_white: bool,
    /// Copy color pages through untouched.
    #[serde(default)]
    pub skip_color: bool,
    #[serde(default = "default_threads")]
    pub threads: usize,
}

impl Step for AutolevelAction {
    fn run(
        &self,
        ctx: &mut WorkerContext,
        volume: &VolumeConfig,
        _config: &OrchestratorConfig,
    ) -> Result<ActionReport> {
        let out_dir = ctx.output_dir(&self.base_path, volume);
        if ctx.dry_run {
            return Ok(preview(ctx, "autolevel", out_dir, self));
        }
        ctx.tools.package("image")?;
        let effects = Arc::clone(&ctx.effects);
        let source = ctx.current_dir.clone();
        let batch = PageBatch {
            label: "autolevel",
            source_dir: &source,
            out_dir: &out_dir,
            threads: self.threads,
            needs_colors: true,
            dest_ext: Some("png"),
            only_pages: None,
        };
        let report = run_batch(ctx, volume, batch, |job| {
            if job.is_color && self.skip_color {
                return skip::apply(SkipMode::Copy, &job.src, &out_dir);
            }
            effects.autolevel(&job.src, &job.dest, self, job.is_color)?;
            Ok(PageResult::Processed)
        })?;
        ctx.update_cwd(out_dir);
        Ok(report)
    }

    fn required_tools(&self) -> ToolRequirements {
        ToolRequirements::from([("image".to_string(), ToolKind::Package)])
    }

    fn validate(&self, prefix: &str, issues: &mut Vec<ConfigIssue>) {
        check_range(issues, format!("{prefix}.upper_limit"), self.upper_limit, 1, 255);
        check_range(issues, format!("{prefix}.peak_offset"), self.peak_offset, -20, 20);
        check_range(issues, format!("{prefix}.min_peak_pct"), self.min_peak_pct, 0.0, 100.0);
        check_threads(issues, prefix, self.threads);
    }
}

// ---------------------------------------------------------------------------
// Posterize
// ---------------------------------------------------------------------------

fn default_posterized_path() -> PathBuf {
    PathBuf::from("posterized")
}

fn default_bpc() -> u32 {
    4
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosterizeAction {
    #[serde(default = "default_posterized_path")]
    pub base_path: PathBuf,
    /// Bits kept per channel.
    #[serde(default = "default_bpc")]
    pub bpc: u32,
    #[serde(default)]
    pub native: bool,
    #[serde(default = "default_threads")]
    pub threads: usize,
}

impl Step for PosterizeAction {
    fn run(
        &self,
        ctx: &mut WorkerContext,
        volume: &VolumeConfig,
        _config: &OrchestratorConfig,
    ) -> Result<ActionReport> {
        let out_dir = ctx.output_dir(&self.base_path, volume);
        if ctx.dry_run {
            return Ok(preview(ctx, "posterize", out_dir, self));
        }
        let magick = magick_backend(ctx, self.native)?;
        let effects = Arc::clone(&ctx.effects);
        let source = ctx.current_dir.clone();
        let batch = PageBatch {
            label: "posterize",
            source_dir: &source,
            out_dir: &out_dir,
            threads: self.threads,
            needs_colors: true,
            dest_ext: Some("png"),
            only_pages: None,
        };
        let report = run_batch(ctx, volume, batch, |job| {
            // color pages keep their full depth
            if job.is_color {
                return skip::apply(SkipMode::Copy, &job.src, &out_dir);
            }
            let backend = magick.as_deref().map_or(Backend::Native, Backend::Binary);
            effects.posterize(backend, &job.src, &job.dest, self.bpc)?;
            Ok(PageResult::Processed)
        })?;
        ctx.update_cwd(out_dir);
        Ok(report)
    }

    fn required_tools(&self) -> ToolRequirements {
        magick_or_image(self.native)
    }

    fn validate(&self, prefix: &str, issues: &mut Vec<ConfigIssue>) {
        check_range(issues, format!("{prefix}.bpc"), self.bpc, 1, 8);
        check_threads(issues, prefix, self.threads);
    }
}

// ---------------------------------------------------------------------------
// Optimize
// ---------------------------------------------------------------------------

fn default_optimized_path() -> PathBuf {
    PathBuf::from("optimized")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeAction {
    #[serde(default = "default_optimized_path")]
    pub base_path: PathBuf,
    /// Recompress the current directory's files instead of writing a new tree.
    ///
    /// In place there is no destination to compare against, so a rerun
    /// recompresses every page again and never reports `already_done`.
    #[serde(default)]
    pub in_place: bool,
    #[serde(default)]
    pub aggressive: bool,
    /// Only touch files with this extension, e.g. `png`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limiter: Option<String>,
    #[serde(default = "default_threads")]
    pub threads: usize,
}

impl OptimizeAction {
    fn matches_limiter(&self, src: &std::path::Path) -> bool {
        let Some(limit) = &self.limiter else {
            return true;
        };
        let limit = limit.trim_start_matches('.');
        src.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(limit))
    }
}

impl Step for OptimizeAction {
    fn run(
        &self,
        ctx: &mut WorkerContext,
        volume: &VolumeConfig,
        _config: &OrchestratorConfig,
    ) -> Result<ActionReport> {
        let out_dir = if self.in_place {
            ctx.current_dir.clone()
        } else {
            ctx.output_dir(&self.base_path, volume)
        };
        if ctx.dry_run {
            return Ok(preview(ctx, "optimize", out_dir, self));
        }
        let pingo = ctx.tools.binary("pingo")?.to_path_buf();
        let effects = Arc::clone(&ctx.effects);
        let source = ctx.current_dir.clone();
        let batch = PageBatch {
            label: "optimize",
            source_dir: &source,
            out_dir: &out_dir,
            threads: self.threads,
            needs_colors: false,
            dest_ext: None,
            only_pages: None,
        };
        let in_place = self.in_place;
        let report = run_batch(ctx, volume, batch, |job| {
            if !self.matches_limiter(&job.src) {
                return if in_place {
                    Ok(PageResult::Ignored)
                } else {
                    skip::apply(SkipMode::Copy, &job.src, &out_dir)
                };
            }
            effects.optimize(&pingo, &job.src, &job.dest, self.aggressive)?;
            Ok(PageResult::Processed)
        })?;
        ctx.update_cwd(out_dir);
        Ok(report)
    }

    fn required_tools(&self) -> ToolRequirements {
        binary("pingo")
    }

    fn validate(&self, prefix: &str, issues: &mut Vec<ConfigIssue>) {
        check_threads(issues, prefix, self.threads);
    }
}
