use crate::config::ConfigIssue;
use crate::tools::MissingTool;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FolioError {
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("config already exists: {0}")]
    ConfigExists(PathBuf),

    #[error("invalid configuration:\n{}", format_issues(.0))]
    InvalidConfig(Vec<ConfigIssue>),

    #[error("required tools unavailable: {}", format_missing(.0))]
    ToolsUnavailable(Vec<MissingTool>),

    #[error("unsupported operator '{0}'")]
    UnsupportedOperator(String),

    #[error("tool '{0}' was not resolved during pre-flight")]
    ToolNotResolved(String),

    #[error("cannot parse page number from '{0}'")]
    PageParse(String),

    #[error("rename conflict on '{target}': {reason}")]
    Conflict { target: String, reason: String },

    #[error("{tool} failed on '{file}': {reason}")]
    Transform {
        tool: String,
        file: String,
        reason: String,
    },

    #[error("page {page} of '{file}' is not covered by any chapter")]
    NoChapter { file: String, page: u32 },

    #[error("directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn format_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("  - {}: {}", i.field, i.message))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_missing(missing: &[MissingTool]) -> String {
    missing
        .iter()
        .map(|m| format!("{} ({}, needed by {})", m.name, m.kind, m.needed_by.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, FolioError>;
