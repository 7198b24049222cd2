// src/engine/mod.rs

//! Orchestration engine for assetpipe.
//!
//! This module ties together:
//! - the DAG scheduler
//! - the trigger queue (what happens when triggers arrive while a run is active)
//! - the main runtime event loop that reacts to:
//!   - manual and file-watch triggers
//!   - task completion events
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]. [`build`] wraps both for one-shot and
//! long-lived sessions.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::types::ReloadKind;

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Outcome of a task action for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    /// The action failed; the string is the rendered error.
    Failed(String),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success)
    }
}

/// Why a task was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    /// Manual trigger (e.g. the tasks named on the command line).
    Manual,
    /// Triggered due to a filesystem event.
    FileWatch,
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// If true, exit the runtime once the DAG is idle and there are no
    /// queued triggers (one-shot builds).
    pub exit_when_idle: bool,
}

/// A finished task action as reported by an executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCompletion {
    pub task: TaskName,
    pub run_id: u64,
    pub outcome: TaskOutcome,
    pub duration: Duration,
    pub reload: ReloadKind,
    pub outputs: Vec<PathBuf>,
}

impl TaskCompletion {
    pub fn success(task: impl Into<TaskName>, run_id: u64) -> Self {
        Self {
            task: task.into(),
            run_id,
            outcome: TaskOutcome::Success,
            duration: Duration::ZERO,
            reload: ReloadKind::None,
            outputs: Vec::new(),
        }
    }

    pub fn failed(task: impl Into<TaskName>, run_id: u64, reason: impl Into<String>) -> Self {
        Self {
            outcome: TaskOutcome::Failed(reason.into()),
            ..Self::success(task, run_id)
        }
    }

    pub fn with_reload(mut self, reload: ReloadKind) -> Self {
        self.reload = reload;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<PathBuf>) -> Self {
        self.outputs = outputs;
        self
    }
}

/// Events flowing into the runtime from watchers, executors, etc.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// These tasks (and their dependencies) should be run.
    TasksTriggered {
        tasks: Vec<TaskName>,
        reason: TriggerReason,
    },
    /// A task action finished.
    TaskCompleted(TaskCompletion),
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// Published on the build-event channel for every task completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildEvent {
    pub run_id: u64,
    pub task: TaskName,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub error: Option<String>,
    pub reload: ReloadKind,
    pub outputs: Vec<PathBuf>,
}

impl BuildEvent {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl From<&TaskCompletion> for BuildEvent {
    fn from(c: &TaskCompletion) -> Self {
        Self {
            run_id: c.run_id,
            task: c.task.clone(),
            duration: c.duration,
            error: match &c.outcome {
                TaskOutcome::Success => None,
                TaskOutcome::Failed(reason) => Some(reason.clone()),
            },
            reload: c.reload,
            outputs: c.outputs.clone(),
        }
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

pub mod build;
pub mod core;
pub mod event_handlers;
pub mod queue;
pub mod report;
pub mod runtime;

pub use build::{Engine, EngineHandle};
pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use queue::TriggerQueue;
pub use report::RunReport;
pub use runtime::Runtime;
