// src/dag/scheduler_step.rs

use crate::dag::task_info::ScheduledTask;
use crate::engine::{RunReport, TaskName};

/// What changed when the scheduler handled one trigger or completion.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Ready to start now.
    pub newly_scheduled: Vec<ScheduledTask>,
    pub newly_failed: Vec<TaskName>,
    /// Will not start in this run.
    pub newly_skipped: Vec<TaskName>,
    /// Set when this step ended the run.
    pub finished: Option<RunReport>,
}

#[cfg(test)]
impl SchedulerStep {
    /// True when this step ended the run.
    pub(crate) fn run_just_finished(&self) -> bool {
        self.finished.is_some()
    }
}
