// src/engine/runtime.rs

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::dag::ScheduledTask;
use crate::errors::Result;
use crate::exec::ExecutorBackend;

use super::core::CoreRuntime;
use super::{BuildEvent, CoreCommand, RunReport, RuntimeEvent};

/// Drives the DAG scheduler in response to `RuntimeEvent`s and delegates
/// task execution to an `ExecutorBackend`.
///
/// All semantics live in `CoreRuntime`; this struct only reads events from
/// the channel, dispatches tasks, publishes build events and records run
/// reports.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    events_tx: broadcast::Sender<BuildEvent>,
    run_started: HashMap<u64, Instant>,
    reports: Vec<RunReport>,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("reports", &self.reports.len())
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
        events_tx: broadcast::Sender<BuildEvent>,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
            events_tx,
            run_started: HashMap::new(),
            reports: Vec::new(),
        }
    }

    /// Main event loop.
    ///
    /// Returns the reports of every run that finished before the loop
    /// stopped, in order.
    pub async fn run(mut self) -> Result<Vec<RunReport>> {
        debug!("assetpipe runtime started");

        loop {
            let Some(event) = self.event_rx.recv().await else {
                debug!("runtime event channel closed; exiting");
                break;
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);
            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                debug!("core requested exit; stopping runtime");
                break;
            }
        }

        Ok(self.reports)
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchTasks(tasks) => self.spawn_ready(tasks).await?,
            CoreCommand::PublishEvent(event) => self.publish(event),
            CoreCommand::RunFinished(report) => self.finish_run(report),
            CoreCommand::RequestExit => debug!("core issued RequestExit command"),
        }
        Ok(())
    }

    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        for task in &tasks {
            self.run_started.entry(task.run_id).or_insert_with(Instant::now);
        }

        let names: Vec<_> = tasks.iter().map(|t| t.name.as_str()).collect();
        debug!(?names, run_id = tasks[0].run_id, "spawning ready tasks");

        self.executor.spawn_ready_tasks(tasks).await
    }

    fn publish(&self, event: BuildEvent) {
        match &event.error {
            None => info!(
                task = %event.task,
                run_id = event.run_id,
                duration_ms = event.duration.as_millis() as u64,
                outputs = event.outputs.len(),
                "finished task"
            ),
            Some(err) => error!(
                task = %event.task,
                run_id = event.run_id,
                error = %err,
                "task failed"
            ),
        }

        // No subscribers is fine (plain builds have no dev server).
        let _ = self.events_tx.send(event);
    }

    fn finish_run(&mut self, mut report: RunReport) {
        if let Some(started) = self.run_started.remove(&report.run_id) {
            report.duration = started.elapsed();
        }

        if report.failed.is_empty() {
            info!(
                run_id = report.run_id,
                tasks = report.succeeded.len(),
                duration_ms = report.duration.as_millis() as u64,
                "run finished"
            );
        } else {
            warn!(
                run_id = report.run_id,
                failed = ?report.failed,
                skipped = ?report.skipped,
                "run finished with failures"
            );
        }

        self.reports.push(report);
    }
}
