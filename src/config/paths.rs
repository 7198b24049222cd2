// src/config/paths.rs

use std::path::{Path, PathBuf};

use crate::config::model::ConfigFile;
use crate::mode::BuildMode;
use crate::types::OutputRoots;

/// Absolute project layout resolved against the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub source: PathBuf,
    pub staging: PathBuf,
    pub output: PathBuf,
    /// Names directly under `output` that `clean` preserves.
    pub keep: Vec<String>,
}

impl ProjectPaths {
    pub fn from_config(root: impl Into<PathBuf>, cfg: &ConfigFile) -> Self {
        let root = root.into();
        let paths = cfg.paths();
        Self {
            source: root.join(&paths.source),
            staging: root.join(&paths.staging),
            output: root.join(&paths.output),
            keep: paths.keep.clone(),
            root,
        }
    }

    /// Layout with the conventional defaults (`app`, `.tmp`, `dist`).
    pub fn conventional(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            source: root.join("app"),
            staging: root.join(".tmp"),
            output: root.join("dist"),
            keep: vec![".git".to_string()],
            root,
        }
    }

    /// Root that receives output for the given mode.
    pub fn dest_root(&self, mode: BuildMode) -> &Path {
        if mode.release { &self.output } else { &self.staging }
    }

    /// All roots a task writes to.
    pub fn dest_roots(&self, mode: BuildMode, roots: OutputRoots) -> Vec<PathBuf> {
        match roots {
            OutputRoots::Mode => vec![self.dest_root(mode).to_path_buf()],
            OutputRoots::Both => vec![self.staging.clone(), self.output.clone()],
        }
    }

    /// Directories the dev server searches, in order: the configured ones,
    /// or staging then source.
    pub fn serve_roots(&self, configured: Option<&[String]>) -> Vec<PathBuf> {
        match configured {
            Some(roots) => roots.iter().map(|r| self.root.join(r)).collect(),
            None => vec![self.staging.clone(), self.source.clone()],
        }
    }
}
