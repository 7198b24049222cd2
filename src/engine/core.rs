// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for reading
//! events from channels, handing `ScheduledTask`s to the executor and
//! publishing build events.
//!
//! The core is unit tested without any Tokio, channels, filesystem, or
//! processes.

use crate::dag::Scheduler;
use crate::engine::event_handlers::{handle_task_completion, handle_tasks_triggered};
use crate::engine::queue::TriggerQueue;
use crate::engine::{CoreCommand, CoreStep, RuntimeEvent, RuntimeOptions};
use crate::types::TriggerWhileRunningBehaviour;

/// Pure core runtime state.
///
/// It owns the DAG scheduler, the trigger queue and the runtime options. It
/// has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    queue: TriggerQueue,
    options: RuntimeOptions,
}

impl CoreRuntime {
    pub fn new(
        scheduler: Scheduler,
        behaviour: TriggerWhileRunningBehaviour,
        queue_length: usize,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            scheduler,
            queue: TriggerQueue::new(behaviour, queue_length),
            options,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
    }

    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TasksTriggered { tasks, reason } => handle_tasks_triggered(
                &mut self.scheduler,
                &mut self.queue,
                &self.options,
                tasks,
                reason,
            ),
            RuntimeEvent::TaskCompleted(completion) => handle_task_completion(
                &mut self.scheduler,
                &mut self.queue,
                &self.options,
                completion,
            ),
            RuntimeEvent::ShutdownRequested => CoreStep {
                commands: vec![CoreCommand::RequestExit],
                keep_running: false,
            },
        }
    }
}
