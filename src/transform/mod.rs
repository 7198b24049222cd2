// src/transform/mod.rs

//! Content transforms and transform chains.
//!
//! - [`builtin`] holds the transforms selectable with `use = "..."`.
//! - [`cache`] memoises cacheable transforms by content hash.
//! - [`lexer`] separates code from literals for the minifiers.
//!
//! A [`Transform`] is a synchronous `(path, bytes) -> (path, bytes)`
//! function. Chains are run on the blocking thread pool by the pipeline.

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use crate::config::TransformStep;
use crate::errors::TransformError;
use crate::mode::BuildMode;
use crate::types::When;

pub mod builtin;
pub mod cache;
pub mod lexer;

pub use cache::{CachedTransform, FileTransformCache, MemoryTransformCache, TransformCache};

/// A file flowing through a chain. `path` is relative to the task's base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

impl Asset {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }

    /// Contents as UTF-8, or a `TransformError` naming `transform`.
    pub fn text(&self, transform: &str) -> Result<&str, TransformError> {
        std::str::from_utf8(&self.contents)
            .map_err(|e| TransformError::new(transform, &self.path, format!("not UTF-8: {e}")))
    }
}

/// A pure content transform.
pub trait Transform: Send + Sync + Debug {
    /// Stable identity; part of the cache key, so it must change whenever
    /// the output for a given input would.
    fn id(&self) -> String;

    /// Cacheable transforms must be pure and keep `asset.path` unchanged.
    fn cacheable(&self) -> bool {
        false
    }

    /// True for transforms that append a source map.
    fn writes_sourcemap(&self) -> bool {
        false
    }

    fn apply(&self, asset: Asset) -> Result<Asset, TransformError>;
}

/// One configured step: a transform plus the modes it is active in.
#[derive(Debug, Clone)]
pub struct ChainStep {
    pub when: When,
    pub transform: Arc<dyn Transform>,
}

impl ChainStep {
    pub fn always(transform: Arc<dyn Transform>) -> Self {
        Self {
            when: When::Always,
            transform,
        }
    }

    pub fn when(when: When, transform: Arc<dyn Transform>) -> Self {
        Self { when, transform }
    }

    /// Build from a config entry using the built-in transform table.
    pub fn from_config(step: &TransformStep) -> Self {
        Self::when(step.when, builtin::from_step(step))
    }
}

/// The transforms active for one mode, applied left to right.
#[derive(Debug, Clone, Default)]
pub struct TransformChain {
    steps: Vec<Arc<dyn Transform>>,
}

impl TransformChain {
    pub fn new(steps: Vec<Arc<dyn Transform>>) -> Self {
        Self { steps }
    }

    /// Select the steps active in `mode`.
    ///
    /// At most one source map is written per file: if several sourcemap
    /// steps are active, only the last one is kept.
    pub fn for_mode(task: &str, steps: &[ChainStep], mode: BuildMode) -> Self {
        let active: Vec<Arc<dyn Transform>> = steps
            .iter()
            .filter(|s| s.when.applies(mode.release))
            .map(|s| Arc::clone(&s.transform))
            .collect();

        let sourcemaps = active.iter().filter(|t| t.writes_sourcemap()).count();
        if sourcemaps <= 1 {
            return Self::new(active);
        }

        warn!(
            task = %task,
            count = sourcemaps,
            "several sourcemap steps active; keeping only the last"
        );
        let mut seen = 0;
        let steps = active
            .into_iter()
            .filter(|t| {
                if !t.writes_sourcemap() {
                    return true;
                }
                seen += 1;
                seen == sourcemaps
            })
            .collect();
        Self::new(steps)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.steps.iter().map(|t| t.id()).collect()
    }

    /// Wrap every cacheable step with `cache`.
    pub fn with_cache(self, cache: Arc<dyn TransformCache>) -> Self {
        let steps = self
            .steps
            .into_iter()
            .map(|t| -> Arc<dyn Transform> {
                if t.cacheable() {
                    Arc::new(CachedTransform::new(t, Arc::clone(&cache)))
                } else {
                    t
                }
            })
            .collect();
        Self { steps }
    }

    pub fn apply(&self, asset: Asset) -> Result<Asset, TransformError> {
        self.steps.iter().try_fold(asset, |asset, t| t.apply(asset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::builtin::{Rename, Sourcemap};

    #[test]
    fn chain_filters_by_mode_and_keeps_last_sourcemap() {
        let steps = vec![
            ChainStep::always(Arc::new(Rename::new("css"))),
            ChainStep::when(When::Debug, Arc::new(Sourcemap)),
            ChainStep::always(Arc::new(Sourcemap)),
            ChainStep::when(When::Release, Arc::new(Rename::new("min.css"))),
        ];

        let debug = TransformChain::for_mode("styles", &steps, BuildMode::debug());
        assert_eq!(debug.ids(), vec!["rename:css", "sourcemap"]);

        let release = TransformChain::for_mode("styles", &steps, BuildMode::release());
        assert_eq!(release.ids(), vec!["rename:css", "sourcemap", "rename:min.css"]);
    }

    #[test]
    fn chain_composes_left_to_right() {
        let chain = TransformChain::new(vec![
            Arc::new(Rename::new("css")),
            Arc::new(Rename::new("txt")),
        ]);
        let out = chain.apply(Asset::new("main.scss", "a")).unwrap();
        assert_eq!(out.path, PathBuf::from("main.txt"));
    }
}
