use crate::error::{FolioError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// An executable found on disk.
    Binary,
    /// A backend compiled into this binary.
    Package,
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ToolKind::Binary => "binary",
            ToolKind::Package => "package",
        })
    }
}

/// Tool name → kind, as declared by an action.
pub type ToolRequirements = BTreeMap<String, ToolKind>;

/// In-process packages available in this build.
pub fn builtin_packages() -> &'static [&'static str] {
    if cfg!(feature = "native") {
        &["image"]
    } else {
        &[]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingTool {
    pub name: String,
    pub kind: ToolKind,
    /// Action instance names that need the tool.
    pub needed_by: Vec<String>,
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Binary(PathBuf),
    Package,
}

pub trait ToolResolver {
    fn resolve(&self, name: &str, kind: ToolKind) -> Option<Resolved>;
}

/// Explicit override paths first, then `PATH` lookup.
#[derive(Debug, Clone, Default)]
pub struct SystemResolver {
    overrides: BTreeMap<String, PathBuf>,
}

impl SystemResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.overrides.insert(name.into(), path.into());
        self
    }

    fn candidates(name: &str) -> &[&str] {
        match name {
            "waifu2x" => &["waifu2x-ncnn-vulkan", "waifu2x"],
            "7z" => &["7z", "7zz", "7za"],
            "magick" => &["magick"],
            "pingo" => &["pingo"],
            "cjpegli" => &["cjpegli"],
            "exiftool" => &["exiftool"],
            _ => &[],
        }
    }
}

impl ToolResolver for SystemResolver {
    fn resolve(&self, name: &str, kind: ToolKind) -> Option<Resolved> {
        match kind {
            ToolKind::Package => builtin_packages()
                .contains(&name)
                .then_some(Resolved::Package),
            ToolKind::Binary => {
                if let Some(path) = self.overrides.get(name) {
                    if path.is_file() {
                        return Some(Resolved::Binary(path.clone()));
                    }
                    return which::which(path).ok().map(Resolved::Binary);
                }
                let fallback = [name];
                let names = match Self::candidates(name) {
                    [] => &fallback[..],
                    c => c,
                };
                names
                    .iter()
                    .find_map(|n| which::which(n).ok())
                    .map(Resolved::Binary)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ToolSet
// ---------------------------------------------------------------------------

/// Tools resolved during pre-flight, handed to actions through the context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolSet {
    binaries: BTreeMap<String, PathBuf>,
    packages: BTreeSet<String>,
}

impl ToolSet {
    pub fn insert_binary(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.binaries.insert(name.into(), path.into());
    }

    pub fn insert_package(&mut self, name: impl Into<String>) {
        self.packages.insert(name.into());
    }

    pub fn binary(&self, name: &str) -> Result<&Path> {
        self.binaries
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| FolioError::ToolNotResolved(name.to_string()))
    }

    /// Succeeds when the in-process package `name` was resolved.
    pub fn package(&self, name: &str) -> Result<()> {
        if self.packages.contains(name) {
            Ok(())
        } else {
            Err(FolioError::ToolNotResolved(name.to_string()))
        }
    }

    pub fn binaries(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.binaries.iter().map(|(k, v)| (k.as_str(), v.as_path()))
    }
}

/// Resolve the union of `requirements` (instance name → its tools).
///
/// Returns the resolved set together with every tool that could not be found.
pub fn preflight<R: ToolResolver + ?Sized>(
    requirements: &[(String, ToolRequirements)],
    resolver: &R,
) -> (ToolSet, Vec<MissingTool>) {
    let mut wanted: BTreeMap<(String, ToolKind), Vec<String>> = BTreeMap::new();
    for (step, tools) in requirements {
        for (name, kind) in tools {
            wanted
                .entry((name.clone(), *kind))
                .or_default()
                .push(step.clone());
        }
    }

    let mut set = ToolSet::default();
    let mut missing = Vec::new();
    for ((name, kind), needed_by) in wanted {
        match resolver.resolve(&name, kind) {
            Some(Resolved::Binary(path)) => {
                tracing::debug!(tool = %name, path = %path.display(), "resolved");
                set.insert_binary(name, path);
            }
            Some(Resolved::Package) => set.insert_package(name),
            None => missing.push(MissingTool {
                name,
                kind,
                needed_by,
            }),
        }
    }
    (set, missing)
}
