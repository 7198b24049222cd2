// src/engine/build.rs

//! One-shot builds and long-lived engine sessions.
//!
//! [`Engine`] owns the task registry and the build environment. A one-shot
//! build ([`Engine::run`]) spins up a runtime that exits once the requested
//! tasks are done; [`Engine::start`] keeps the runtime alive so a watcher
//! (or anything else holding the [`EngineHandle`]) can trigger more runs.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::actions::{BuildEnv, cache_for, registry_from_config};
use crate::config::{ConfigFile, ProjectPaths};
use crate::dag::{Scheduler, TaskRegistry};
use crate::errors::{AssetpipeError, Result};
use crate::exec::ActionExecutor;
use crate::fs::RealFileSystem;
use crate::mode::BuildMode;
use crate::types::TriggerWhileRunningBehaviour;

use super::{BuildEvent, CoreRuntime, RunReport, Runtime, RuntimeEvent, RuntimeOptions, TaskName, TriggerReason};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const RUNTIME_CHANNEL_CAPACITY: usize = 64;

/// Registry plus environment, ready to run builds.
pub struct Engine {
    registry: Arc<TaskRegistry>,
    env: BuildEnv,
    behaviour: TriggerWhileRunningBehaviour,
    queue_length: usize,
    keep_going: bool,
    events_tx: broadcast::Sender<BuildEvent>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("tasks", &self.registry.len())
            .field("env", &self.env)
            .field("behaviour", &self.behaviour)
            .field("keep_going", &self.keep_going)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(registry: TaskRegistry, env: BuildEnv) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            registry: Arc::new(registry),
            env,
            behaviour: TriggerWhileRunningBehaviour::Queue,
            queue_length: 1,
            keep_going: false,
            events_tx,
        }
    }

    /// Engine for a validated config rooted at `root`, using the real
    /// filesystem.
    pub fn from_config(cfg: &ConfigFile, root: &Path, mode: BuildMode) -> Result<Self> {
        let paths = ProjectPaths::from_config(root, cfg);
        let registry = registry_from_config(cfg, cache_for(cfg, &paths))?;
        let env = BuildEnv::new(mode, paths, Arc::new(RealFileSystem));
        let section = cfg.config_section();
        Ok(Self::new(registry, env)
            .with_behaviour(cfg.behaviour(), section.queue_length)
            .with_keep_going(section.keep_going))
    }

    pub fn with_behaviour(mut self, behaviour: TriggerWhileRunningBehaviour, queue_length: usize) -> Self {
        self.behaviour = behaviour;
        self.queue_length = queue_length;
        self
    }

    pub fn with_keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn env(&self) -> &BuildEnv {
        &self.env
    }

    pub fn mode(&self) -> BuildMode {
        self.env.mode
    }

    /// Receive a [`BuildEvent`] for every task completion from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.events_tx.subscribe()
    }

    /// Sender side of the build-event channel (for the dev server).
    pub fn events(&self) -> broadcast::Sender<BuildEvent> {
        self.events_tx.clone()
    }

    /// Run the named tasks (and their dependencies) once.
    ///
    /// Unknown names and dependency cycles are reported before anything
    /// runs. Failed tasks are listed in the report, not returned as an
    /// error; use [`RunReport::into_result`] for that.
    pub async fn run<S: AsRef<str>>(&self, names: &[S]) -> Result<RunReport> {
        let plan = self.registry.plan(names)?;
        if plan.requested.is_empty() {
            debug!("nothing requested");
            return Ok(RunReport::default());
        }
        info!(tasks = ?plan.requested, release = self.env.mode.release, "starting build");

        let handle = self.spawn(RuntimeOptions {
            exit_when_idle: true,
        });
        handle.trigger(plan.requested, TriggerReason::Manual).await?;
        let mut reports = handle.join().await?;
        reports
            .pop()
            .ok_or_else(|| AssetpipeError::InvalidState("build finished without a run report".into()))
    }

    /// Start a long-lived session. Runs happen whenever the handle (or a
    /// clone of its sender) triggers tasks.
    pub fn start(&self) -> EngineHandle {
        self.spawn(RuntimeOptions::default())
    }

    fn spawn(&self, options: RuntimeOptions) -> EngineHandle {
        let (tx, rx) = mpsc::channel::<RuntimeEvent>(RUNTIME_CHANNEL_CAPACITY);
        let scheduler = Scheduler::from_registry(&self.registry, self.keep_going);
        let core = CoreRuntime::new(scheduler, self.behaviour, self.queue_length, options);
        let executor = ActionExecutor::new(Arc::clone(&self.registry), self.env.clone(), tx.clone());
        let runtime = Runtime::new(core, rx, executor, self.events_tx.clone());

        EngineHandle {
            tx,
            join: tokio::spawn(runtime.run()),
        }
    }
}

/// Handle to a running engine session.
#[derive(Debug)]
pub struct EngineHandle {
    tx: mpsc::Sender<RuntimeEvent>,
    join: JoinHandle<Result<Vec<RunReport>>>,
}

impl EngineHandle {
    /// Sender for watchers and signal handlers.
    pub fn sender(&self) -> mpsc::Sender<RuntimeEvent> {
        self.tx.clone()
    }

    pub async fn trigger(&self, tasks: Vec<TaskName>, reason: TriggerReason) -> Result<()> {
        self.tx
            .send(RuntimeEvent::TasksTriggered { tasks, reason })
            .await
            .map_err(|_| AssetpipeError::InvalidState("engine runtime has stopped".into()))
    }

    /// Ask the runtime to stop and wait for it. Tasks still running are
    /// abandoned; finished runs are returned.
    pub async fn shutdown(self) -> Result<Vec<RunReport>> {
        // The runtime may already have exited on its own.
        let _ = self.tx.send(RuntimeEvent::ShutdownRequested).await;
        self.join().await
    }

    async fn join(self) -> Result<Vec<RunReport>> {
        drop(self.tx);
        self.join
            .await
            .map_err(|e| AssetpipeError::Other(anyhow::anyhow!("engine runtime panicked: {e}")))?
    }
}
