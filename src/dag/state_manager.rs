// src/dag/state_manager.rs

//! Per-run state management for tasks in the scheduler.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::dag::DagGraph;
use crate::dag::task_info::{RunState, ScheduledTask, TaskInfo};
use crate::engine::TaskName;

/// Manages per-run state transitions for tasks.
pub struct StateManager<'a> {
    graph: &'a DagGraph,
    tasks: &'a mut HashMap<TaskName, TaskInfo>,
    current_run_id: Option<u64>,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a DagGraph,
        tasks: &'a mut HashMap<TaskName, TaskInfo>,
        current_run_id: Option<u64>,
    ) -> Self {
        Self {
            graph,
            tasks,
            current_run_id,
        }
    }

    /// Include a requested task and all of its transitive dependencies in
    /// this run.
    ///
    /// - Tasks that were not yet part of the run (`run_state == None`) are
    ///   marked `Pending`.
    /// - Tasks already participating in this run keep their current state, so
    ///   a task never runs twice within one run.
    pub fn mark_task_and_dependencies_pending(&mut self, root: &str) {
        let mut stack: Vec<TaskName> = vec![root.to_string()];
        let mut visited: HashSet<TaskName> = HashSet::new();

        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }

            if let Some(info) = self.tasks.get_mut(&name) {
                if info.run_state.is_none() {
                    info.run_state = Some(RunState::Pending);
                    debug!(task = %info.name, "marked Pending for this run");
                }
                stack.extend(self.graph.dependencies_of(&name).iter().cloned());
            } else {
                warn!(task = %name, "node in DAG not present in tasks map");
            }
        }
    }

    /// Every dependency must have completed successfully in this run; the
    /// dependency closure is always part of the run, so history is not
    /// consulted.
    pub fn deps_satisfied_for_info(&self, info: &TaskInfo) -> bool {
        info.deps.iter().all(|dep_name| match self.tasks.get(dep_name) {
            Some(dep) => dep.run_state == Some(RunState::Succeeded),
            None => {
                warn!(
                    task = %info.name,
                    dep = %dep_name,
                    "dependency missing from tasks map"
                );
                false
            }
        })
    }

    /// Mark every pending transitive dependent of `failed_task` as `Skipped`.
    ///
    /// Returns the list of tasks that were newly skipped.
    pub fn mark_dependents_skipped(&mut self, failed_task: &str) -> Vec<TaskName> {
        let mut stack: Vec<TaskName> = self.graph.dependents_of(failed_task).to_vec();
        let mut newly_skipped = Vec::new();

        while let Some(name) = stack.pop() {
            if let Some(info) = self.tasks.get_mut(&name) {
                if info.run_state == Some(RunState::Pending) {
                    info.run_state = Some(RunState::Skipped);
                    debug!(
                        task = %info.name,
                        upstream = %failed_task,
                        "skipping dependent due to upstream failure"
                    );
                    newly_skipped.push(info.name.clone());
                    stack.extend(self.graph.dependents_of(&name).iter().cloned());
                }
            }
        }

        newly_skipped
    }

    /// Skip pending tasks that can no longer run because a dependency already
    /// failed or was skipped in this run (e.g. tasks merged into a run after
    /// the failure happened).
    pub fn skip_blocked_tasks(&mut self) -> Vec<TaskName> {
        let mut newly_skipped = Vec::new();

        loop {
            let blocked: Vec<TaskName> = self
                .tasks
                .values()
                .filter(|info| info.run_state == Some(RunState::Pending))
                .filter(|info| {
                    info.deps.iter().any(|d| {
                        matches!(
                            self.tasks.get(d).and_then(|t| t.run_state),
                            Some(RunState::Failed) | Some(RunState::Skipped)
                        )
                    })
                })
                .map(|info| info.name.clone())
                .collect();

            if blocked.is_empty() {
                return newly_skipped;
            }

            for name in blocked {
                if let Some(info) = self.tasks.get_mut(&name) {
                    info.run_state = Some(RunState::Skipped);
                    newly_skipped.push(name);
                }
            }
        }
    }

    /// Mark everything still pending as `Skipped` (used when a halted run
    /// drains).
    pub fn skip_all_pending(&mut self) -> Vec<TaskName> {
        let mut skipped = Vec::new();
        for info in self.tasks.values_mut() {
            if info.run_state == Some(RunState::Pending) {
                info.run_state = Some(RunState::Skipped);
                skipped.push(info.name.clone());
            }
        }
        skipped.sort();
        skipped
    }

    /// Collect tasks that are `Pending` and whose dependencies are satisfied,
    /// mark them as `Running`, and return them as `ScheduledTask`s.
    pub fn collect_new_ready_tasks(&mut self) -> Vec<ScheduledTask> {
        // Decide first, then mutate to avoid borrowing issues.
        let mut candidates: Vec<TaskName> = self
            .tasks
            .values()
            .filter(|info| {
                matches!(info.run_state, Some(RunState::Pending))
                    && self.deps_satisfied_for_info(info)
            })
            .map(|info| info.name.clone())
            .collect();
        candidates.sort();

        let mut ready = Vec::with_capacity(candidates.len());
        for name in candidates {
            if let Some(info) = self.tasks.get_mut(&name) {
                let kind = if info.is_rebuild() { "rebuild" } else { "first build" };
                info!(task = %info.name, run_id = self.current_run_id, kind, "scheduling task");
                info.run_state = Some(RunState::Running);
                ready.push(ScheduledTask::new(info.name.clone(), self.current_run_id.unwrap_or(0)));
            }
        }

        ready
    }

    /// True if no task is running.
    pub fn none_running(&self) -> bool {
        !self
            .tasks
            .values()
            .any(|info| info.run_state == Some(RunState::Running))
    }

    /// Check if all tasks are in a terminal state (or not in the run).
    pub fn all_tasks_terminal(&self) -> bool {
        self.tasks
            .values()
            .all(|info| info.run_state.is_none_or(RunState::is_terminal))
    }
}
