use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::dag::graph::DagGraph;
use crate::dag::registry::TaskRegistry;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::StateManager;
use crate::dag::task_info::{RunState, ScheduledTask, TaskInfo, TaskRunState};
use crate::engine::{RunReport, TaskName, TaskOutcome};

/// Scheduler holds the immutable DAG plus mutable per-run state.
///
/// It is responsible for:
/// - remembering which tasks are part of the current run
/// - deciding when a requested task is "ready" to run (deps satisfied)
/// - marking tasks as succeeded/failed/skipped
/// - halting the run on failure (or, with `keep_going`, skipping only the
///   failed task's dependents)
#[derive(Debug)]
pub struct Scheduler {
    graph: DagGraph,
    tasks: HashMap<TaskName, TaskInfo>,
    keep_going: bool,
    /// Monotonically increasing run ID.
    run_counter: u64,
    /// Currently active run ID, or `None` if there is no active run.
    current_run_id: Option<u64>,
    /// No new task starts in a halted run.
    halted: bool,
    requested: Vec<TaskName>,
    succeeded: Vec<TaskName>,
    failed: Vec<TaskName>,
}

impl Scheduler {
    pub fn new(graph: DagGraph, keep_going: bool) -> Self {
        let tasks = graph
            .tasks()
            .map(|name| {
                let deps = graph.dependencies_of(name).to_vec();
                (name.to_string(), TaskInfo::new(name.to_string(), deps))
            })
            .collect();

        Self {
            graph,
            tasks,
            keep_going,
            run_counter: 0,
            current_run_id: None,
            halted: false,
            requested: Vec::new(),
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Construct a scheduler over every task of a registry.
    pub fn from_registry(registry: &TaskRegistry, keep_going: bool) -> Self {
        Self::new(registry.graph(), keep_going)
    }

    /// Returns `true` if there is currently no active run.
    pub fn is_idle(&self) -> bool {
        self.current_run_id.is_none()
    }

    /// Current run ID, if any.
    pub fn current_run_id(&self) -> Option<u64> {
        self.current_run_id
    }

    /// True if a task failed in the active run and no new task may start.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Read-only view of the given task's run state.
    pub fn run_state_of(&self, task: &str) -> Option<TaskRunState> {
        let info = self.tasks.get(task)?;
        Some(info.run_state.into())
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.graph.tasks()
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    /// Start a new run, resetting per-run state but keeping history for
    /// logging.
    pub fn start_new_run(&mut self) {
        self.run_counter += 1;
        self.current_run_id = Some(self.run_counter);
        self.halted = false;
        self.requested.clear();
        self.succeeded.clear();
        self.failed.clear();

        for info in self.tasks.values_mut() {
            info.run_state = None;
        }

        debug!(run_id = self.run_counter, "scheduler: starting new run");
    }

    /// Request a task (and its dependency closure) in the current run.
    pub fn handle_trigger(&mut self, task: &str) -> Vec<ScheduledTask> {
        self.trigger_step_internal(task).newly_scheduled
    }

    /// Handle completion of a task with a concrete outcome.
    pub fn handle_completion(&mut self, task: &str, outcome: TaskOutcome) -> Vec<ScheduledTask> {
        self.completion_step_internal(task, outcome).newly_scheduled
    }

    /// Manual-step variant of `handle_trigger` that returns a rich [`SchedulerStep`].
    pub fn step_trigger(&mut self, task: &str) -> SchedulerStep {
        self.trigger_step_internal(task)
    }

    /// Manual-step variant of `handle_completion` that returns a rich [`SchedulerStep`].
    pub fn step_completion(&mut self, task: &str, outcome: TaskOutcome) -> SchedulerStep {
        self.completion_step_internal(task, outcome)
    }

    /// Finish the run if nothing is left to do, returning its report.
    fn maybe_finish_run(&mut self, step: &mut SchedulerStep) {
        let Some(run_id) = self.current_run_id else {
            return;
        };

        let mut manager = StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);

        if self.halted && manager.none_running() {
            step.newly_skipped.extend(manager.skip_all_pending());
        }

        if !manager.all_tasks_terminal() {
            return;
        }

        let mut skipped: Vec<TaskName> = self
            .tasks
            .values()
            .filter(|info| info.run_state == Some(RunState::Skipped))
            .map(|info| info.name.clone())
            .collect();
        skipped.sort();
        let mut failed = self.failed.clone();
        failed.sort();

        info!(
            run_id,
            succeeded = self.succeeded.len(),
            failed = failed.len(),
            skipped = skipped.len(),
            "scheduler: all tasks terminal; marking run as finished"
        );

        self.current_run_id = None;
        step.finished = Some(RunReport {
            run_id,
            requested: self.requested.clone(),
            succeeded: self.succeeded.clone(),
            failed,
            skipped,
            duration: Duration::ZERO,
        });
    }

    fn trigger_step_internal(&mut self, task: &str) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        if self.current_run_id.is_none() {
            warn!(
                task = %task,
                "handle_trigger called with no active run; implicitly starting a new run"
            );
            self.start_new_run();
        }

        if self.halted {
            warn!(task = %task, "trigger for a halted run; ignoring");
            return step;
        }

        if self.tasks.contains_key(task) {
            if !self.requested.iter().any(|t| t == task) {
                self.requested.push(task.to_string());
            }
            let mut manager = StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);
            manager.mark_task_and_dependencies_pending(task);
            step.newly_skipped = manager.skip_blocked_tasks();
            step.newly_scheduled = manager.collect_new_ready_tasks();
        } else {
            warn!(task = %task, "trigger for unknown task; ignoring");
        }

        self.maybe_finish_run(&mut step);
        step
    }

    fn completion_step_internal(&mut self, task: &str, outcome: TaskOutcome) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        let Some(run_id) = self.current_run_id else {
            warn!(
                task = %task,
                "handle_completion called with no active run; ignoring"
            );
            return step;
        };

        let Some(info) = self.tasks.get_mut(task) else {
            warn!(task = %task, "completion for unknown task; ignoring");
            return step;
        };

        if info.run_state != Some(RunState::Running) {
            warn!(
                task = %task,
                run_id,
                state = ?info.run_state,
                "completion for a task that is not running; ignoring"
            );
            return step;
        }

        match outcome {
            TaskOutcome::Success => {
                info.finish(run_id, true);
                debug!(task = %info.name, run_id, "task completed successfully");
                self.succeeded.push(task.to_string());
            }
            TaskOutcome::Failed(reason) => {
                info.finish(run_id, false);
                self.failed.push(task.to_string());
                step.newly_failed.push(task.to_string());

                let mut manager =
                    StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);
                if self.keep_going {
                    warn!(task = %task, run_id, %reason, "task failed; skipping its dependents");
                    step.newly_skipped = manager.mark_dependents_skipped(task);
                } else {
                    warn!(task = %task, run_id, %reason, "task failed; no new tasks will start in this run");
                    self.halted = true;
                }
            }
        }

        if !self.halted {
            let mut manager = StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);
            step.newly_scheduled = manager.collect_new_ready_tasks();
        }

        self.maybe_finish_run(&mut step);
        step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fan_out() -> Scheduler {
        // A <- B, A <- C, D independent
        let graph = DagGraph::from_edges([
            ("A", vec![]),
            ("B", vec!["A"]),
            ("C", vec!["A"]),
            ("D", vec![]),
        ]);
        Scheduler::new(graph, false)
    }

    fn names(tasks: &[ScheduledTask]) -> Vec<&str> {
        tasks.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn dependencies_run_first_and_once() {
        let mut s = fan_out();
        s.start_new_run();
        assert_eq!(names(&s.handle_trigger("B")), vec!["A"]);
        assert!(s.handle_trigger("C").is_empty());

        let ready = s.handle_completion("A", TaskOutcome::Success);
        assert_eq!(names(&ready), vec!["B", "C"]);

        s.handle_completion("B", TaskOutcome::Success);
        let step = s.step_completion("C", TaskOutcome::Success);
        let report = step.finished.expect("run should finish");
        assert_eq!(report.succeeded, vec!["A", "B", "C"]);
        assert_eq!(report.requested, vec!["B", "C"]);
        assert!(report.is_success());
        assert!(s.is_idle());
    }

    #[test]
    fn failure_halts_new_work_but_lets_running_tasks_finish() {
        let mut s = fan_out();
        s.start_new_run();
        let mut ready = s.handle_trigger("B");
        ready.extend(s.handle_trigger("D"));
        assert_eq!(names(&ready), vec!["A", "D"]);

        let step = s.step_completion("A", TaskOutcome::Failed("boom".into()));
        assert!(step.newly_scheduled.is_empty());
        assert!(!step.run_just_finished());
        assert!(s.is_halted());

        // D was already running and may still complete.
        let step = s.step_completion("D", TaskOutcome::Success);
        let report = step.finished.expect("halted run drains once nothing runs");
        assert_eq!(report.failed, vec!["A"]);
        assert_eq!(report.skipped, vec!["B"]);
        assert_eq!(report.succeeded, vec!["D"]);
    }

    #[test]
    fn keep_going_only_skips_the_dependent_subtree() {
        let graph = DagGraph::from_edges([("A", vec![]), ("B", vec!["A"]), ("D", vec![])]);
        let mut s = Scheduler::new(graph, true);
        s.start_new_run();
        s.handle_trigger("B");

        let step = s.step_completion("A", TaskOutcome::Failed("boom".into()));
        assert_eq!(step.newly_skipped, vec!["B"]);
        let report = step.finished.expect("nothing left to run");
        assert_eq!(report.failed, vec!["A"]);

        // A new run can still execute unrelated work.
        s.start_new_run();
        assert_eq!(names(&s.handle_trigger("D")), vec!["D"]);
    }

    #[test]
    fn duplicate_completion_is_ignored() {
        let mut s = fan_out();
        s.start_new_run();
        s.handle_trigger("D");
        let step = s.step_completion("D", TaskOutcome::Success);
        assert!(step.run_just_finished());
        let again = s.step_completion("D", TaskOutcome::Success);
        assert!(again.finished.is_none());
    }
}
