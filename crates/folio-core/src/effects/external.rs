use crate::actions::{PackFormat, RescaleTarget, ResizeKernel, SpreadDirection};
use crate::error::{FolioError, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub(super) struct Waifu2xArgs<'a> {
    pub model: &'a str,
    pub device_id: i32,
    pub tile_size: u32,
    pub noise_level: i32,
    pub scale: u32,
}

fn tool_name(tool: &Path) -> String {
    tool.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| tool.display().to_string())
}

/// Run `cmd`, mapping a spawn failure or non-zero exit to [`FolioError::Transform`].
fn execute(tool: &Path, mut cmd: Command, file: &Path) -> Result<()> {
    tracing::debug!(cmd = ?cmd, "running");
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|e| FolioError::Transform {
            tool: tool_name(tool),
            file: file.display().to_string(),
            reason: e.to_string(),
        })?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let reason = match stderr.trim() {
        "" => format!("exited with {}", output.status),
        text => text.lines().last().unwrap_or(text).to_string(),
    };
    Err(FolioError::Transform {
        tool: tool_name(tool),
        file: file.display().to_string(),
        reason,
    })
}

pub(super) fn waifu2x(tool: &Path, src: &Path, dest: &Path, args: &Waifu2xArgs<'_>) -> Result<()> {
    let mut cmd = Command::new(tool);
    cmd.arg("-i")
        .arg(src)
        .arg("-o")
        .arg(dest)
        .args(["-n", &args.noise_level.to_string()])
        .args(["-s", &args.scale.to_string()])
        .args(["-t", &args.tile_size.to_string()])
        .args(["-g", &args.device_id.to_string()])
        .args(["-m", args.model])
        .args(["-f", "png"]);
    execute(tool, cmd, src)
}

pub(super) fn magick_filter(kernel: ResizeKernel) -> &'static str {
    match kernel {
        ResizeKernel::Nearest => "Point",
        ResizeKernel::Box => "Box",
        ResizeKernel::Bilinear => "Triangle",
        ResizeKernel::Bicubic => "Cubic",
        ResizeKernel::CatmullRom => "Catrom",
        ResizeKernel::Mitchell => "Mitchell",
        ResizeKernel::Gaussian => "Gaussian",
        ResizeKernel::Lanczos => "Lanczos",
        ResizeKernel::Hamming => "Hamming",
    }
}

pub(super) fn magick_geometry(target: &RescaleTarget) -> String {
    match target {
        RescaleTarget::Exact { width, height } => format!("{width}x{height}!"),
        RescaleTarget::Width { width } => format!("{width}"),
        RescaleTarget::Height { height } => format!("x{height}"),
        RescaleTarget::Fit { width, height } => format!("{width}x{height}"),
        RescaleTarget::Multiply { factor } => format!("{}%", factor * 100.0),
    }
}

pub(super) fn magick_rescale(
    magick: &Path,
    src: &Path,
    dest: &Path,
    target: &RescaleTarget,
    kernel: ResizeKernel,
) -> Result<()> {
    let mut cmd = Command::new(magick);
    cmd.arg(src)
        .args(["-filter", magick_filter(kernel)])
        .args(["-resize", &magick_geometry(target)])
        .arg(dest);
    execute(magick, cmd, src)
}

pub(super) fn magick_posterize(magick: &Path, src: &Path, dest: &Path, bpc: u32) -> Result<()> {
    let levels = 1u32 << bpc.min(8);
    let mut cmd = Command::new(magick);
    cmd.arg(src)
        .args(["-posterize", &levels.to_string()])
        .arg(dest);
    execute(magick, cmd, src)
}

pub(super) fn magick_append(
    magick: &Path,
    images: &[PathBuf],
    dest: &Path,
    direction: SpreadDirection,
    quality: u32,
) -> Result<()> {
    let mut cmd = Command::new(magick);
    match direction {
        SpreadDirection::Ltr => cmd.args(images),
        SpreadDirection::Rtl => cmd.args(images.iter().rev()),
    };
    cmd.arg("+append")
        .args(["-quality", &quality.to_string()])
        .arg(dest);
    execute(magick, cmd, dest)
}

pub(super) fn pingo(pingo: &Path, file: &Path, aggressive: bool) -> Result<()> {
    let mut cmd = Command::new(pingo);
    cmd.args(["-notime", "-lossless", "-notrans"])
        .arg(if aggressive { "-s9" } else { "-s4" })
        .arg(file);
    execute(pingo, cmd, file)
}

pub(super) fn cjpegli(cjpegli: &Path, src: &Path, dest: &Path, quality: u32) -> Result<()> {
    let mut cmd = Command::new(cjpegli);
    cmd.args(["-q", &quality.to_string()]).arg(src).arg(dest);
    execute(cjpegli, cmd, src)
}

/// Tag names written by [`exiftool`], paired with whether they carry the email.
pub(super) const EXIF_TAGS: &[(&str, bool)] = &[
    ("XPComment", true),
    ("Artist", true),
    ("XPAuthor", true),
    ("XPTitle", false),
    ("ImageDescription", false),
    ("Title", false),
    ("Description", false),
];

pub(super) fn exiftool(exiftool: &Path, dir: &Path, title: &str, email: &str) -> Result<()> {
    let mut cmd = Command::new(exiftool);
    for (tag, is_email) in EXIF_TAGS {
        let value = if *is_email { email } else { title };
        cmd.arg(format!("-{tag}={value}"));
    }
    cmd.arg("-overwrite_original_in_place");
    for ext in ["jpg", "jpeg", "png", "tif", "tiff"] {
        cmd.args(["-ext", ext]);
    }
    cmd.arg(dir);
    execute(exiftool, cmd, dir)
}

pub(super) fn sevenzip(
    sevenzip: &Path,
    files: &[PathBuf],
    archive: &Path,
    format: PackFormat,
    level: u32,
) -> Result<()> {
    let kind = match format {
        PackFormat::Cbz => "-tzip",
        PackFormat::Cb7 => "-t7z",
    };
    let mut cmd = Command::new(sevenzip);
    cmd.arg("a")
        .arg(kind)
        .arg(format!("-mx={level}"))
        .arg("-y")
        .arg(archive)
        .args(files);
    execute(sevenzip, cmd, archive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_strings() {
        assert_eq!(
            magick_geometry(&RescaleTarget::Exact {
                width: 800,
                height: 600
            }),
            "800x600!"
        );
        assert_eq!(magick_geometry(&RescaleTarget::Height { height: 1600 }), "x1600");
        assert_eq!(magick_geometry(&RescaleTarget::Multiply { factor: 0.5 }), "50%");
    }

    #[test]
    fn spawn_failure_is_a_transform_error() {
        let err = cjpegli(
            Path::new("/nonexistent/cjpegli"),
            Path::new("in.png"),
            Path::new("out.jpg"),
            90,
        )
        .unwrap_err();
        match err {
            FolioError::Transform { tool, file, .. } => {
                assert_eq!(tool, "cjpegli");
                assert_eq!(file, "in.png");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn email_goes_to_author_tags() {
        let author: Vec<_> = EXIF_TAGS.iter().filter(|(_, e)| *e).map(|(t, _)| *t).collect();
        assert_eq!(author, vec!["XPComment", "Artist", "XPAuthor"]);
    }
}
