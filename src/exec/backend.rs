// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of running actions
//! itself. This makes it easy to swap in a fake executor in tests while
//! keeping the production executor in [`ActionExecutor`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::actions::{BuildEnv, TaskContext};
use crate::dag::{ScheduledTask, TaskDefinition, TaskRegistry};
use crate::engine::{RuntimeEvent, TaskCompletion};
use crate::errors::Result;

/// Trait abstracting how scheduled tasks are executed.
///
/// Implementations must eventually send exactly one
/// `RuntimeEvent::TaskCompleted` per dispatched task.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Runs registered task actions.
///
/// Every dispatched task gets its own Tokio task, so independent tasks of a
/// run execute concurrently.
pub struct ActionExecutor {
    registry: Arc<TaskRegistry>,
    env: BuildEnv,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
}

impl ActionExecutor {
    pub fn new(
        registry: Arc<TaskRegistry>,
        env: BuildEnv,
        runtime_tx: mpsc::Sender<RuntimeEvent>,
    ) -> Self {
        Self {
            registry,
            env,
            runtime_tx,
        }
    }

    fn spawn_one(&self, task: ScheduledTask) {
        let tx = self.runtime_tx.clone();

        let Some(def) = self.registry.get(&task.name).cloned() else {
            warn!(task = %task.name, "dispatched task is not registered");
            let completion =
                TaskCompletion::failed(&task.name, task.run_id, format!("unknown task '{}'", task.name));
            tokio::spawn(async move {
                let _ = tx.send(RuntimeEvent::TaskCompleted(completion)).await;
            });
            return;
        };

        let ctx = self.env.context(task.name, task.run_id);
        tokio::spawn(async move {
            let completion = run_task(&def, &ctx).await;
            if tx.send(RuntimeEvent::TaskCompleted(completion)).await.is_err() {
                debug!(task = %ctx.task, "runtime gone; dropping completion");
            }
        });
    }
}

impl ExecutorBackend for ActionExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for task in tasks {
                self.spawn_one(task);
            }
            Ok(())
        })
    }
}

/// Run one task's action and describe the result for the scheduler.
pub async fn run_task(def: &TaskDefinition, ctx: &TaskContext) -> TaskCompletion {
    info!(task = %ctx.task, run_id = ctx.run_id, "starting task");
    let started = Instant::now();
    let result = def.action.run(ctx).await;
    let duration = started.elapsed();

    match result {
        Ok(report) => {
            debug!(
                task = %ctx.task,
                written = report.written.len(),
                removed = report.removed.len(),
                "task succeeded"
            );
            TaskCompletion::success(&ctx.task, ctx.run_id)
                .with_duration(duration)
                .with_reload(def.reload)
                .with_outputs(report.written)
        }
        Err(err) => TaskCompletion::failed(&ctx.task, ctx.run_id, err.to_string())
            .with_duration(duration)
            .with_reload(def.reload),
    }
}
