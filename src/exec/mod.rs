// src/exec/mod.rs

//! Task execution layer.
//!
//! The runtime hands ready tasks to an [`ExecutorBackend`]. In production
//! that is [`ActionExecutor`], which runs each task's action on its own
//! Tokio task and reports a [`TaskCompletion`](crate::engine::TaskCompletion)
//! back through the runtime event channel. Tests substitute a fake backend
//! that completes tasks without doing any work.

pub mod backend;

pub use backend::{ActionExecutor, ExecutorBackend, run_task};
