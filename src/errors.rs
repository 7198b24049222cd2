// src/errors.rs

//! Crate-wide error type and `Result` alias.

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::TaskName;

/// A single file failed inside a transform chain.
///
/// This is recoverable at the pipeline level: the file is skipped and the
/// failure is recorded on the owning task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{transform} failed on {path:?}: {message}")]
pub struct TransformError {
    pub transform: String,
    pub path: PathBuf,
    pub message: String,
}

impl TransformError {
    pub fn new(
        transform: impl Into<String>,
        path: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            transform: transform.into(),
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AssetpipeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    UnknownTask(String),

    #[error("Task already registered: {0}")]
    DuplicateTask(String),

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: TaskName, dependency: TaskName },

    #[error("Cycle detected in task graph: {0}")]
    DagCycle(String),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("{failed} of {total} file(s) failed in task '{task}'")]
    TransformFailures {
        task: TaskName,
        failed: usize,
        total: usize,
    },

    #[error("Bundle error: {0}")]
    Bundle(String),

    #[error("Lint reported {0} error(s)")]
    Lint(usize),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Task(s) failed: {}", .0.join(", "))]
    TasksFailed(Vec<TaskName>),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, AssetpipeError>;
