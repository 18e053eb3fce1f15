//! In-process transforms on top of the `image` crate.

use crate::actions::{AutolevelAction, RescaleTarget, ResizeKernel, SpreadDirection};
use crate::error::{FolioError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use std::path::{Path, PathBuf};

fn image_error(file: &Path, err: impl std::fmt::Display) -> FolioError {
    FolioError::Transform {
        tool: "image".to_string(),
        file: file.display().to_string(),
        reason: err.to_string(),
    }
}

fn open(path: &Path) -> Result<DynamicImage> {
    let img = image::open(path).map_err(|e| image_error(path, e))?;
    tracing::trace!(
        file = %path.display(),
        width = img.width(),
        height = img.height(),
        "image loaded"
    );
    Ok(img)
}

fn save_png(img: &DynamicImage, dest: &Path) -> Result<()> {
    img.save_with_format(dest, ImageFormat::Png)
        .map_err(|e| image_error(dest, e))
}

fn is_grayscale(img: &DynamicImage) -> bool {
    !img.color().has_color()
}

pub(super) fn filter(kernel: ResizeKernel) -> FilterType {
    match kernel {
        ResizeKernel::Nearest | ResizeKernel::Box => FilterType::Nearest,
        ResizeKernel::Bilinear | ResizeKernel::Hamming => FilterType::Triangle,
        ResizeKernel::Bicubic | ResizeKernel::CatmullRom | ResizeKernel::Mitchell => {
            FilterType::CatmullRom
        }
        ResizeKernel::Gaussian => FilterType::Gaussian,
        ResizeKernel::Lanczos => FilterType::Lanczos3,
    }
}

fn scaled(value: u32, factor: f64) -> u32 {
    ((value as f64 * factor).round() as u32).max(1)
}

/// Output dimensions for `target`, or `None` when aspect-preserving fit applies.
pub(super) fn target_size(width: u32, height: u32, target: &RescaleTarget) -> Option<(u32, u32)> {
    match *target {
        RescaleTarget::Exact { width, height } => Some((width, height)),
        RescaleTarget::Width { width: w } => {
            Some((w, scaled(height, w as f64 / width.max(1) as f64)))
        }
        RescaleTarget::Height { height: h } => {
            Some((scaled(width, h as f64 / height.max(1) as f64), h))
        }
        RescaleTarget::Fit { .. } => None,
        RescaleTarget::Multiply { factor } => Some((scaled(width, factor), scaled(height, factor))),
    }
}

pub(super) fn rescale(
    src: &Path,
    dest: &Path,
    target: &RescaleTarget,
    kernel: ResizeKernel,
) -> Result<()> {
    let img = open(src)?;
    let filter = filter(kernel);
    let out = match (target_size(img.width(), img.height(), target), target) {
        (Some((w, h)), _) => img.resize_exact(w, h, filter),
        (None, RescaleTarget::Fit { width, height }) => img.resize(*width, *height, filter),
        (None, _) => img,
    };
    save_png(&out, dest)
}

pub(super) fn posterize(src: &Path, dest: &Path, bpc: u32) -> Result<()> {
    let img = open(src)?;
    let mask: u8 = 0xFFu8 << (8 - bpc.clamp(1, 8));
    let out = if is_grayscale(&img) {
        let mut gray = img.to_luma8();
        gray.pixels_mut().for_each(|p| p.0[0] &= mask);
        DynamicImage::ImageLuma8(gray)
    } else {
        let mut rgb = img.to_rgb8();
        rgb.pixels_mut()
            .for_each(|p| p.0.iter_mut().for_each(|c| *c &= mask));
        DynamicImage::ImageRgb8(rgb)
    };
    save_png(&out, dest)
}

// ---------------------------------------------------------------------------
// Autolevel
// ---------------------------------------------------------------------------

fn histogram(gray: &GrayImage) -> [u64; 256] {
    let mut hist = [0u64; 256];
    for p in gray.pixels() {
        hist[p.0[0] as usize] += 1;
    }
    hist
}

fn is_peak(hist: &[u64; 256], i: usize, min_count: f64) -> bool {
    let here = hist[i];
    here > 0
        && here >= hist[i - 1]
        && here >= hist[i + 1]
        && here as f64 >= min_count
}

/// First histogram peak in `1..upper_limit`, 0 when none qualifies.
pub(super) fn black_level(hist: &[u64; 256], upper_limit: u32, min_peak_pct: f64) -> u32 {
    let total: u64 = hist.iter().sum();
    let min_count = total as f64 * min_peak_pct / 100.0;
    let upper = (upper_limit as usize).min(255);
    (1..upper)
        .find(|&i| is_peak(hist, i, min_count))
        .map(|i| i as u32)
        .unwrap_or(0)
}

/// First peak scanning down from 254 within `upper_limit` of white, 255 when none.
pub(super) fn white_level(hist: &[u64; 256], upper_limit: u32, min_peak_pct: f64) -> u32 {
    let total: u64 = hist.iter().sum();
    let min_count = total as f64 * min_peak_pct / 100.0;
    let lower = 255usize.saturating_sub(upper_limit as usize).max(1);
    (lower..255)
        .rev()
        .find(|&i| is_peak(hist, i, min_count))
        .map(|i| i as u32)
        .unwrap_or(255)
}

/// Exponent that keeps mid-gray at mid-gray once `black` is pulled to zero.
pub(super) fn gamma_for(black: u32) -> f64 {
    let b = black as f64 / 255.0;
    if b <= 0.0 || b >= 0.5 {
        return 1.0;
    }
    0.5f64.ln() / ((0.5 - b) / (1.0 - b)).ln()
}

pub(super) fn level_table(black: i32, white: i32, gamma: f64) -> [u8; 256] {
    let bp = black.clamp(0, 254);
    let wp = white.clamp(bp + 1, 255);
    let mut table = [0u8; 256];
    for (v, out) in table.iter_mut().enumerate() {
        let v = v as i32;
        *out = if v <= bp {
            0
        } else if v >= wp {
            255
        } else {
            let norm = (v - bp) as f64 / (wp - bp) as f64;
            (norm.powf(gamma) * 255.0).round().clamp(0.0, 255.0) as u8
        };
    }
    table
}

pub(super) fn autolevel(
    src: &Path,
    dest: &Path,
    params: &AutolevelAction,
    keep_color: bool,
) -> Result<()> {
    let img = open(src)?;
    let gray = img.to_luma8();
    let hist = histogram(&gray);

    let black = black_level(&hist, params.upper_limit, params.min_peak_pct);
    let white = if params.skip_white {
        255
    } else {
        white_level(&hist, params.upper_limit, params.min_peak_pct)
    };
    let black_bad = black == 0;
    let white_bad = !params.skip_white && white >= 255;
    let bad = (black_bad && (params.skip_white || white_bad)) || black > params.upper_limit;

    if bad {
        tracing::debug!(file = %src.display(), black, white, "no usable levels");
        let out = if keep_color {
            DynamicImage::ImageRgb8(img.to_rgb8())
        } else {
            DynamicImage::ImageLuma8(gray)
        };
        return save_png(&out, dest);
    }

    let table = level_table(black as i32 + params.peak_offset, white as i32, gamma_for(black));
    tracing::trace!(file = %src.display(), black, white, "applying levels");
    let out = if keep_color {
        let mut rgb = img.to_rgb8();
        for Rgb(channels) in rgb.pixels_mut() {
            channels.iter_mut().for_each(|c| *c = table[*c as usize]);
        }
        DynamicImage::ImageRgb8(rgb)
    } else {
        let mut gray = gray;
        for Luma([v]) in gray.pixels_mut() {
            *v = table[*v as usize];
        }
        DynamicImage::ImageLuma8(gray)
    };
    save_png(&out, dest)
}

// ---------------------------------------------------------------------------
// Spreads
// ---------------------------------------------------------------------------

pub(super) fn join_spreads(
    images: &[PathBuf],
    dest: &Path,
    direction: SpreadDirection,
    quality: u32,
) -> Result<()> {
    let mut loaded = images.iter().map(|p| open(p)).collect::<Result<Vec<_>>>()?;
    if direction == SpreadDirection::Rtl {
        loaded.reverse();
    }
    let width: u32 = loaded.iter().map(|i| i.width()).sum();
    let height = loaded.iter().map(|i| i.height()).max().unwrap_or(0);

    let joined = if loaded.iter().all(is_grayscale) {
        let mut canvas = GrayImage::from_pixel(width, height, Luma([255]));
        let mut x = 0i64;
        for img in &loaded {
            image::imageops::overlay(&mut canvas, &img.to_luma8(), x, 0);
            x += img.width() as i64;
        }
        DynamicImage::ImageLuma8(canvas)
    } else {
        let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
        let mut x = 0i64;
        for img in &loaded {
            image::imageops::overlay(&mut canvas, &img.to_rgb8(), x, 0);
            x += img.width() as i64;
        }
        DynamicImage::ImageRgb8(canvas)
    };

    let is_jpeg = dest
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));
    if !is_jpeg {
        return save_png(&joined, dest);
    }

    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100) as u8);
    joined
        .write_with_encoder(encoder)
        .map_err(|e| image_error(dest, e))?;
    std::fs::write(dest, buffer)?;
    Ok(())
}
