// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Compiling `watch` / `exclude` glob patterns into per-task bindings.
//! - Debouncing bursts of filesystem events per binding.
//! - Wiring up a cross-platform filesystem watcher (`notify`) that feeds
//!   debounced triggers into the engine runtime.
//!
//! It does not run anything itself; it only turns filesystem changes into
//! task-level triggers.

pub mod bindings;
pub mod dag_filter;
pub mod debounce;
pub mod path_utils;
pub mod session;

pub use bindings::{WatchBinding, WatchBindings};
pub use debounce::{Change, ChangeKind, DebouncedTrigger, Debouncer};
pub use session::WatchSession;
