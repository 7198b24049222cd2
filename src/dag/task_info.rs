// src/dag/task_info.rs

use crate::engine::TaskName;

/// Where a task stands within the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Requested, waiting for its dependencies.
    Pending,
    /// Handed to the executor.
    Running,
    Succeeded,
    Failed,
    /// Never started: a dependency failed or the run halted.
    Skipped,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed | RunState::Skipped)
    }
}

/// Read-only view of [`RunState`] for callers outside the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunState {
    /// Not requested in the current run.
    NotInRun,
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl From<Option<RunState>> for TaskRunState {
    fn from(state: Option<RunState>) -> Self {
        match state {
            None => TaskRunState::NotInRun,
            Some(RunState::Pending) => TaskRunState::Pending,
            Some(RunState::Running) => TaskRunState::Running,
            Some(RunState::Succeeded) => TaskRunState::Succeeded,
            Some(RunState::Failed) => TaskRunState::Failed,
            Some(RunState::Skipped) => TaskRunState::Skipped,
        }
    }
}

/// Outcome of the most recent run a task finished in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastRun {
    pub run_id: u64,
    pub succeeded: bool,
}

/// Scheduler bookkeeping for one registered task.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: TaskName,
    pub deps: Vec<TaskName>,
    /// `None` while the task is not part of the current run.
    pub run_state: Option<RunState>,
    pub last_run: Option<LastRun>,
}

impl TaskInfo {
    pub fn new(name: TaskName, deps: Vec<TaskName>) -> Self {
        Self {
            name,
            deps,
            run_state: None,
            last_run: None,
        }
    }

    /// Record a finished execution and move to the matching terminal state.
    pub fn finish(&mut self, run_id: u64, succeeded: bool) {
        self.run_state = Some(if succeeded { RunState::Succeeded } else { RunState::Failed });
        self.last_run = Some(LastRun { run_id, succeeded });
    }

    pub fn is_rebuild(&self) -> bool {
        self.last_run.is_some()
    }
}

/// A task the executor should start now. Every task of one run carries the
/// same `run_id`; ids increase with each run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub name: TaskName,
    pub run_id: u64,
}

impl ScheduledTask {
    pub fn new(name: impl Into<TaskName>, run_id: u64) -> Self {
        Self {
            name: name.into(),
            run_id,
        }
    }
}
