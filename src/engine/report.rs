// src/engine/report.rs

use std::time::Duration;

use crate::engine::TaskName;
use crate::errors::{AssetpipeError, Result};

/// Summary of one finished run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunReport {
    pub run_id: u64,
    /// Tasks that were triggered (the dependency closure is implied).
    pub requested: Vec<TaskName>,
    /// Tasks that completed successfully, in completion order.
    pub succeeded: Vec<TaskName>,
    pub failed: Vec<TaskName>,
    /// Tasks that never started because of a failure.
    pub skipped: Vec<TaskName>,
    pub duration: Duration,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    /// `Err(TasksFailed)` if anything failed.
    pub fn into_result(self) -> Result<RunReport> {
        if self.failed.is_empty() {
            Ok(self)
        } else {
            Err(AssetpipeError::TasksFailed(self.failed))
        }
    }

    /// Number of times `task` completed in this run (0 or 1).
    pub fn completions_of(&self, task: &str) -> usize {
        self.succeeded.iter().filter(|t| *t == task).count()
    }
}
