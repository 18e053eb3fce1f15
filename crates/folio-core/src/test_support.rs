//! Fixtures shared by unit tests.

use crate::actions::{
    AutolevelAction, DenoiseAction, PackFormat, RescaleTarget, ResizeKernel, SpreadDirection,
    UpscaleAction,
};
use crate::context::WorkerContext;
use crate::effects::{Backend, Effects};
use crate::error::{FolioError, Result};
use crate::tools::ToolSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Effects that copy `src` to `dest` and record every call as `"{op} {file}"`.
#[derive(Default)]
pub(crate) struct RecordingEffects {
    calls: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl RecordingEffects {
    /// Fail any call whose file name contains `needle`.
    pub fn failing_on(needle: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on: Some(needle.to_string()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split(' ').next() == Some(op))
            .count()
    }

    fn record(&self, op: &str, file: &Path) -> Result<()> {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.calls.lock().unwrap().push(format!("{op} {name}"));
        if self.fail_on.as_deref().is_some_and(|n| name.contains(n)) {
            return Err(FolioError::Transform {
                tool: op.to_string(),
                file: name,
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn copy(&self, op: &str, src: &Path, dest: &Path) -> Result<()> {
        self.record(op, src)?;
        if src != dest {
            std::fs::copy(src, dest)?;
        }
        Ok(())
    }
}

impl Effects for RecordingEffects {
    fn denoise(&self, _: &Path, src: &Path, dest: &Path, _: &DenoiseAction) -> Result<()> {
        self.copy("denoise", src, dest)
    }

    fn upscale(&self, _: &Path, src: &Path, dest: &Path, _: &UpscaleAction) -> Result<()> {
        self.copy("upscale", src, dest)
    }

    fn rescale(&self, _: Backend<'_>, src: &Path, dest: &Path, _: &RescaleTarget, _: ResizeKernel) -> Result<()> {
        self.copy("rescale", src, dest)
    }

    fn autolevel(&self, src: &Path, dest: &Path, _: &AutolevelAction, _: bool) -> Result<()> {
        self.copy("autolevel", src, dest)
    }

    fn posterize(&self, _: Backend<'_>, src: &Path, dest: &Path, _: u32) -> Result<()> {
        self.copy("posterize", src, dest)
    }

    fn optimize(&self, _: &Path, src: &Path, dest: &Path, _: bool) -> Result<()> {
        self.copy("optimize", src, dest)
    }

    fn jpegify(&self, _: &Path, src: &Path, dest: &Path, _: u32) -> Result<()> {
        self.copy("jpegify", src, dest)
    }

    fn join_spreads(&self, _: Backend<'_>, images: &[PathBuf], dest: &Path, _: SpreadDirection, _: u32) -> Result<()> {
        self.record("join", dest)?;
        let mut data = Vec::new();
        for img in images {
            data.extend(std::fs::read(img)?);
        }
        std::fs::write(dest, data)?;
        Ok(())
    }

    fn tag(&self, _: &Path, dir: &Path, _: &str, _: &str) -> Result<()> {
        self.record("tag", dir)
    }

    fn pack(&self, _: &Path, files: &[PathBuf], archive: &Path, _: PackFormat, _: u32) -> Result<()> {
        self.record("pack", archive)?;
        let listing: Vec<String> = files
            .iter()
            .filter_map(|f| f.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        std::fs::write(archive, listing.join("\n"))?;
        Ok(())
    }
}

/// Every tool any action can ask for, pointing at placeholder paths.
pub(crate) fn all_tools() -> Arc<ToolSet> {
    let mut tools = ToolSet::default();
    for name in ["waifu2x", "magick", "pingo", "cjpegli", "exiftool", "7z"] {
        tools.insert_binary(name, format!("/opt/tools/{name}"));
    }
    tools.insert_package("image");
    Arc::new(tools)
}

pub(crate) fn write_pages(dir: &Path, names: &[&str]) {
    std::fs::create_dir_all(dir).unwrap();
    for name in names {
        std::fs::write(dir.join(name), name.as_bytes()).unwrap();
    }
}

/// Files directly in `dir`, sorted by name.
pub(crate) fn list(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

pub(crate) fn context(root: &Path, cwd: &Path, effects: Arc<RecordingEffects>) -> WorkerContext {
    WorkerContext::new(root, cwd, all_tools(), effects)
}
