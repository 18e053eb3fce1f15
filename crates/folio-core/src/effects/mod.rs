//! The concrete transforms behind each action.
//!
//! Actions decide *which* files get *what* treatment; an [`Effects`]
//! implementation does the pixel or archive work. [`ToolEffects`] shells out
//! to external binaries and, with the `native` feature, runs the in-process
//! `image` backend. Tests substitute their own implementation.

mod external;
#[cfg(feature = "native")]
mod native;

use crate::actions::{
    AutolevelAction, DenoiseAction, PackFormat, RescaleTarget, ResizeKernel, SpreadDirection,
    UpscaleAction,
};
use crate::error::Result;
use std::path::{Path, PathBuf};

/// Where a transform that has two implementations should run.
#[derive(Debug, Clone, Copy)]
pub enum Backend<'a> {
    Binary(&'a Path),
    Native,
}

pub trait Effects: Send + Sync {
    fn denoise(&self, waifu2x: &Path, src: &Path, dest: &Path, params: &DenoiseAction) -> Result<()>;

    fn upscale(&self, waifu2x: &Path, src: &Path, dest: &Path, params: &UpscaleAction) -> Result<()>;

    fn rescale(
        &self,
        backend: Backend<'_>,
        src: &Path,
        dest: &Path,
        target: &RescaleTarget,
        kernel: ResizeKernel,
    ) -> Result<()>;

    /// Level one page; `keep_color` leaves color pages in RGB.
    fn autolevel(&self, src: &Path, dest: &Path, params: &AutolevelAction, keep_color: bool) -> Result<()>;

    fn posterize(&self, backend: Backend<'_>, src: &Path, dest: &Path, bpc: u32) -> Result<()>;

    /// Recompress `src` into `dest`. `src == dest` means in place.
    fn optimize(&self, pingo: &Path, src: &Path, dest: &Path, aggressive: bool) -> Result<()>;

    fn jpegify(&self, cjpegli: &Path, src: &Path, dest: &Path, quality: u32) -> Result<()>;

    fn join_spreads(
        &self,
        backend: Backend<'_>,
        images: &[PathBuf],
        dest: &Path,
        direction: SpreadDirection,
        quality: u32,
    ) -> Result<()>;

    /// Write title/author metadata into every image of `dir`.
    fn tag(&self, exiftool: &Path, dir: &Path, title: &str, email: &str) -> Result<()>;

    fn pack(
        &self,
        sevenzip: &Path,
        files: &[PathBuf],
        archive: &Path,
        format: PackFormat,
        level: u32,
    ) -> Result<()>;
}

/// Default effects: external binaries plus the native backend when compiled in.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolEffects;

#[cfg(not(feature = "native"))]
fn native_unavailable() -> crate::error::FolioError {
    crate::error::FolioError::ToolNotResolved("image".to_string())
}

impl Effects for ToolEffects {
    fn denoise(&self, waifu2x: &Path, src: &Path, dest: &Path, params: &DenoiseAction) -> Result<()> {
        external::waifu2x(
            waifu2x,
            src,
            dest,
            &external::Waifu2xArgs {
                model: &params.model,
                device_id: params.device_id,
                tile_size: params.tile_size,
                noise_level: params.noise_level,
                scale: 1,
            },
        )
    }

    fn upscale(&self, waifu2x: &Path, src: &Path, dest: &Path, params: &UpscaleAction) -> Result<()> {
        external::waifu2x(
            waifu2x,
            src,
            dest,
            &external::Waifu2xArgs {
                model: &params.model,
                device_id: params.device_id,
                tile_size: params.tile_size,
                noise_level: params.noise_level,
                scale: params.scale,
            },
        )
    }

    fn rescale(
        &self,
        backend: Backend<'_>,
        src: &Path,
        dest: &Path,
        target: &RescaleTarget,
        kernel: ResizeKernel,
    ) -> Result<()> {
        match backend {
            Backend::Binary(magick) => external::magick_rescale(magick, src, dest, target, kernel),
            #[cfg(feature = "native")]
            Backend::Native => native::rescale(src, dest, target, kernel),
            #[cfg(not(feature = "native"))]
            Backend::Native => Err(native_unavailable()),
        }
    }

    fn autolevel(&self, src: &Path, dest: &Path, params: &AutolevelAction, keep_color: bool) -> Result<()> {
        #[cfg(feature = "native")]
        {
            native::autolevel(src, dest, params, keep_color)
        }
        #[cfg(not(feature = "native"))]
        {
            let _ = (src, dest, params, keep_color);
            Err(native_unavailable())
        }
    }

    fn posterize(&self, backend: Backend<'_>, src: &Path, dest: &Path, bpc: u32) -> Result<()> {
        match backend {
            Backend::Binary(magick) => external::magick_posterize(magick, src, dest, bpc),
            #[cfg(feature = "native")]
            Backend::Native => native::posterize(src, dest, bpc),
            #[cfg(not(feature = "native"))]
            Backend::Native => Err(native_unavailable()),
        }
    }

    fn optimize(&self, pingo: &Path, src: &Path, dest: &Path, aggressive: bool) -> Result<()> {
        if src != dest {
            std::fs::copy(src, dest)?;
        }
        let result = external::pingo(pingo, dest, aggressive);
        if result.is_err() && src != dest {
            let _ = std::fs::remove_file(dest);
        }
        result
    }

    fn jpegify(&self, cjpegli: &Path, src: &Path, dest: &Path, quality: u32) -> Result<()> {
        external::cjpegli(cjpegli, src, dest, quality)
    }

    fn join_spreads(
        &self,
        backend: Backend<'_>,
        images: &[PathBuf],
        dest: &Path,
        direction: SpreadDirection,
        quality: u32,
    ) -> Result<()> {
        match backend {
            Backend::Binary(magick) => external::magick_append(magick, images, dest, direction, quality),
            #[cfg(feature = "native")]
            Backend::Native => native::join_spreads(images, dest, direction, quality),
            #[cfg(not(feature = "native"))]
            Backend::Native => Err(native_unavailable()),
        }
    }

    fn tag(&self, exiftool: &Path, dir: &Path, title: &str, email: &str) -> Result<()> {
        external::exiftool(exiftool, dir, title, email)
    }

    fn pack(
        &self,
        sevenzip: &Path,
        files: &[PathBuf],
        archive: &Path,
        format: PackFormat,
        level: u32,
    ) -> Result<()> {
        external::sevenzip(sevenzip, files, archive, format, level)
    }
}
