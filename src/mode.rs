// src/mode.rs

//! Release / watch mode selection.
//!
//! A top-level invocation selects its mode through [`ModeFlags`] and then
//! calls [`ModeFlags::freeze`]. The resulting [`BuildMode`] is a plain `Copy`
//! value that is handed to every task and transform of the run; nothing can
//! change it afterwards.

use crate::errors::{AssetpipeError, Result};

/// Immutable build configuration for one run (or one watch session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildMode {
    pub release: bool,
    pub watch: bool,
}

impl BuildMode {
    pub fn debug() -> Self {
        Self::default()
    }

    pub fn release() -> Self {
        Self {
            release: true,
            watch: false,
        }
    }

    pub fn with_watch(self, watch: bool) -> Self {
        Self { watch, ..self }
    }
}

/// Mode selection before a run starts.
///
/// Both flags start out `false`. Once [`freeze`](ModeFlags::freeze) has been
/// called, further changes fail with `InvalidState`.
#[derive(Debug, Default)]
pub struct ModeFlags {
    mode: BuildMode,
    frozen: bool,
}

impl ModeFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_release(&mut self, release: bool) -> Result<()> {
        self.ensure_mutable("release")?;
        self.mode.release = release;
        Ok(())
    }

    pub fn set_watch(&mut self, watch: bool) -> Result<()> {
        self.ensure_mutable("watch")?;
        self.mode.watch = watch;
        Ok(())
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Lock the flags and return the value to thread through the run.
    ///
    /// Freezing twice is allowed and returns the same mode.
    pub fn freeze(&mut self) -> BuildMode {
        self.frozen = true;
        self.mode
    }

    fn ensure_mutable(&self, flag: &str) -> Result<()> {
        if self.frozen {
            return Err(AssetpipeError::InvalidState(format!(
                "cannot change `{flag}` after the build run has started"
            )));
        }
        Ok(())
    }
}
