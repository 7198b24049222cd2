// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::dag::{ScheduledTask, Scheduler, SchedulerStep, TaskRunState};
use crate::engine::queue::TriggerQueue;
use crate::engine::{
    BuildEvent, RunReport, RuntimeOptions, TaskCompletion, TaskName, TriggerReason,
};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// Publish a task completion on the build-event channel.
    PublishEvent(BuildEvent),
    /// A run finished; the shell records the report.
    RunFinished(RunReport),
    /// Request that the process exits (one-shot builds once idle).
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn new(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }

    /// Tasks dispatched by this step, flattened.
    pub fn dispatched(&self) -> Vec<&ScheduledTask> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::DispatchTasks(tasks) => Some(tasks.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Reports of runs finished by this step.
    pub fn finished_runs(&self) -> Vec<&RunReport> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::RunFinished(report) => Some(report),
                _ => None,
            })
            .collect()
    }
}

/// Handle a batch of task triggers.
///
/// - If the scheduler is idle, start a new run seeded with these triggers
///   plus anything that was already queued.
/// - If a run is active and has not halted, tasks that are not yet part of
///   it are MERGED into it (their closure shares the run id). Tasks already
///   in the run, or any trigger while the run is halted, follow the
///   queue/cancel semantics and are recorded for a *future* run.
pub fn handle_tasks_triggered(
    scheduler: &mut Scheduler,
    queue: &mut TriggerQueue,
    options: &RuntimeOptions,
    tasks: Vec<TaskName>,
    reason: TriggerReason,
) -> CoreStep {
    debug!(?tasks, ?reason, "tasks triggered");
    let mut commands = Vec::new();

    if scheduler.is_idle() {
        let mut triggers: BTreeSet<TaskName> = queue.next_batch().into_iter().collect();
        triggers.extend(tasks);
        commands.extend(start_new_run_from_triggers(
            scheduler,
            triggers.into_iter().collect(),
        ));
    } else {
        for task in tasks {
            match scheduler.run_state_of(&task) {
                None => warn!(task = %task, "trigger for unknown task; ignoring"),
                Some(TaskRunState::NotInRun) if !scheduler.is_halted() => {
                    let step = scheduler.step_trigger(&task);
                    push_step(&mut commands, step);
                }
                Some(_) => queue.record_trigger(&task),
            }
        }
    }

    commands.extend(maybe_start_queued_run(scheduler, queue));
    finish_step(scheduler, queue, options, commands)
}

/// Handle a task completion event.
///
/// Completions that do not belong to the active run, or for tasks that are
/// not running, are ignored and produce no build event.
pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    queue: &mut TriggerQueue,
    options: &RuntimeOptions,
    completion: TaskCompletion,
) -> CoreStep {
    let mut commands = Vec::new();

    let current = scheduler.current_run_id();
    let running = scheduler.run_state_of(&completion.task) == Some(TaskRunState::Running);
    if current != Some(completion.run_id) || !running {
        warn!(
            task = %completion.task,
            run_id = completion.run_id,
            current_run = ?current,
            "stale task completion; ignoring"
        );
        return CoreStep::new(commands);
    }

    commands.push(CoreCommand::PublishEvent(BuildEvent::from(&completion)));

    let step = scheduler.step_completion(&completion.task, completion.outcome);
    push_step(&mut commands, step);

    commands.extend(maybe_start_queued_run(scheduler, queue));
    finish_step(scheduler, queue, options, commands)
}

/// Convenience for seeding a new run from initial root triggers.
///
/// This mirrors the async runtime's logic, but is pure and returns
/// commands instead of performing IO.
pub fn start_new_run_from_triggers(
    scheduler: &mut Scheduler,
    triggers: Vec<TaskName>,
) -> Vec<CoreCommand> {
    let mut commands = Vec::new();

    let known: Vec<TaskName> = triggers
        .into_iter()
        .filter(|task| {
            let known = scheduler.run_state_of(task).is_some();
            if !known {
                warn!(task = %task, "trigger for unknown task; ignoring");
            }
            known
        })
        .collect();

    if known.is_empty() {
        return commands;
    }

    scheduler.start_new_run();

    for task in known {
        let step = scheduler.step_trigger(&task);
        push_step(&mut commands, step);
    }

    merge_dispatches(commands)
}

/// If the scheduler is idle and there are queued triggers, start a new run.
fn maybe_start_queued_run(scheduler: &mut Scheduler, queue: &mut TriggerQueue) -> Vec<CoreCommand> {
    if !scheduler.is_idle() {
        return Vec::new();
    }

    let triggers = queue.next_batch();
    if triggers.is_empty() {
        return Vec::new();
    }

    start_new_run_from_triggers(scheduler, triggers)
}

fn push_step(commands: &mut Vec<CoreCommand>, step: SchedulerStep) {
    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }
    if let Some(report) = step.finished {
        commands.push(CoreCommand::RunFinished(report));
    }
}

/// Collapse consecutive dispatches into one so a new run is handed to the
/// executor as a single batch.
fn merge_dispatches(commands: Vec<CoreCommand>) -> Vec<CoreCommand> {
    let mut merged: Vec<CoreCommand> = Vec::with_capacity(commands.len());
    for command in commands {
        if let CoreCommand::DispatchTasks(next) = &command {
            if let Some(CoreCommand::DispatchTasks(prev)) = merged.last_mut() {
                prev.extend(next.iter().cloned());
                continue;
            }
        }
        merged.push(command);
    }
    merged
}

fn finish_step(
    scheduler: &Scheduler,
    queue: &TriggerQueue,
    options: &RuntimeOptions,
    mut commands: Vec<CoreCommand>,
) -> CoreStep {
    // One-shot builds exit when the DAG is idle and nothing is queued.
    if options.exit_when_idle && scheduler.is_idle() && queue.is_empty() {
        commands.push(CoreCommand::RequestExit);
        return CoreStep {
            commands,
            keep_running: false,
        };
    }
    CoreStep::new(commands)
}
