// src/actions/mod.rs

//! What a task does when it runs.
//!
//! - [`pipeline`] reads files, runs a transform chain and writes outputs.
//! - [`bundle`] runs an external bundler, then post-processes its output.
//! - [`lint`] checks source files against a handful of rules.
//! - [`command`] runs a shell command.
//! - [`clean`] empties the staging and output roots.
//!
//! [`registry_from_config`] turns a validated config into a
//! [`TaskRegistry`] of these actions.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::debug;

use crate::config::{ConfigFile, ProjectPaths, TaskConfig, TaskKind};
use crate::dag::{TaskDefinition, TaskRegistry};
use crate::engine::TaskName;
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::mode::BuildMode;
use crate::transform::{FileTransformCache, MemoryTransformCache, TransformCache};
use crate::types::CacheStorageMode;

pub mod bundle;
pub mod clean;
pub mod command;
pub mod lint;
pub mod pipeline;

pub use bundle::BundleAction;
pub use clean::clean_outputs;
pub use command::CommandAction;
pub use lint::LintAction;
pub use pipeline::{PipelineAction, PipelineSpec};

/// Boxed future returned by [`TaskAction::run`].
pub type ActionFuture<'a> = Pin<Box<dyn Future<Output = Result<TaskReport>> + Send + 'a>>;

/// The work behind a registered task.
pub trait TaskAction: Send + Sync {
    /// One-line description for `assetpipe tasks`.
    fn describe(&self) -> String;

    fn run<'a>(&'a self, ctx: &'a TaskContext) -> ActionFuture<'a>;
}

/// What an action did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskReport {
    /// Files written (absolute).
    pub written: Vec<PathBuf>,
    /// Stale outputs removed (absolute).
    pub removed: Vec<PathBuf>,
}

/// Per-output-path write serialisation shared by every task of a session.
#[derive(Debug, Clone, Default)]
pub struct WriteLocks {
    locks: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl WriteLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `contents` to `path` while holding the path's lock.
    pub fn write(&self, fs: &dyn FileSystem, path: &Path, contents: &[u8]) -> anyhow::Result<()> {
        let lock = Arc::clone(self.locks.entry(path.to_path_buf()).or_default().value());
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        fs.write(path, contents)
    }

    /// Remove `path` while holding the path's lock. Missing files are fine.
    ///
    /// The path's lock is forgotten afterwards unless another writer holds
    /// it, so the map tracks live outputs rather than every path ever built.
    pub fn remove(&self, fs: &dyn FileSystem, path: &Path) -> anyhow::Result<bool> {
        let removed = {
            let lock = Arc::clone(self.locks.entry(path.to_path_buf()).or_default().value());
            let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let exists = fs.is_file(path);
            if exists {
                fs.remove_file(path)?;
            }
            exists
        };
        self.locks.remove_if(path, |_, lock| Arc::strong_count(lock) == 1);
        Ok(removed)
    }
}

/// Everything an action needs that is fixed for a whole session.
#[derive(Clone)]
pub struct BuildEnv {
    pub mode: BuildMode,
    pub paths: Arc<ProjectPaths>,
    pub fs: Arc<dyn FileSystem>,
    pub locks: WriteLocks,
}

impl fmt::Debug for BuildEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildEnv")
            .field("mode", &self.mode)
            .field("root", &self.paths.root)
            .finish_non_exhaustive()
    }
}

impl BuildEnv {
    pub fn new(mode: BuildMode, paths: ProjectPaths, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            mode,
            paths: Arc::new(paths),
            fs,
            locks: WriteLocks::new(),
        }
    }

    /// Context for one task execution.
    pub fn context(&self, task: impl Into<TaskName>, run_id: u64) -> TaskContext {
        TaskContext {
            task: task.into(),
            run_id,
            env: self.clone(),
        }
    }
}

/// Handed to [`TaskAction::run`].
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task: TaskName,
    pub run_id: u64,
    pub env: BuildEnv,
}

impl TaskContext {
    pub fn mode(&self) -> BuildMode {
        self.env.mode
    }

    pub fn paths(&self) -> &ProjectPaths {
        &self.env.paths
    }

    pub fn fs(&self) -> &dyn FileSystem {
        self.env.fs.as_ref()
    }
}

/// Does nothing and succeeds. Used for `group` and `reload` tasks.
#[derive(Debug, Clone)]
pub struct NoopAction {
    label: String,
}

impl NoopAction {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl TaskAction for NoopAction {
    fn describe(&self) -> String {
        self.label.clone()
    }

    fn run<'a>(&'a self, ctx: &'a TaskContext) -> ActionFuture<'a> {
        Box::pin(async move {
            debug!(task = %ctx.task, kind = %self.label, "nothing to do");
            Ok(TaskReport::default())
        })
    }
}

/// Transform cache selected by `[config] cache_storage`.
pub fn cache_for(cfg: &ConfigFile, paths: &ProjectPaths) -> Arc<dyn TransformCache> {
    match cfg.config_section().cache_storage {
        CacheStorageMode::File => Arc::new(FileTransformCache::new(&paths.root)),
        CacheStorageMode::Memory => Arc::new(MemoryTransformCache::new()),
    }
}

/// Watch globs of a task: explicit `watch`, otherwise its inputs.
pub fn default_watch(task: &TaskConfig) -> Vec<String> {
    if let Some(watch) = &task.watch {
        return watch.clone();
    }
    match task.kind {
        TaskKind::Pipeline | TaskKind::Lint => task.src.clone(),
        TaskKind::Bundle => task
            .entry
            .as_deref()
            .map(|entry| {
                let dir = Path::new(entry)
                    .parent()
                    .map(crate::fs::glob::to_slash)
                    .unwrap_or_default();
                if dir.is_empty() {
                    vec!["**/*.js".to_string()]
                } else {
                    vec![format!("{dir}/**/*.js")]
                }
            })
            .unwrap_or_default(),
        TaskKind::Command | TaskKind::Reload | TaskKind::Group => Vec::new(),
    }
}

fn action_for(task: &TaskConfig, cache: &Arc<dyn TransformCache>) -> Result<Arc<dyn TaskAction>> {
    let action: Arc<dyn TaskAction> = match task.kind {
        TaskKind::Pipeline => Arc::new(PipelineAction::from_config(task, Arc::clone(cache))?),
        TaskKind::Bundle => Arc::new(BundleAction::from_config(task)),
        TaskKind::Lint => Arc::new(LintAction::from_config(task)?),
        TaskKind::Command => Arc::new(CommandAction::new(task.cmd.clone().unwrap_or_default())),
        TaskKind::Reload => Arc::new(NoopAction::new("reload")),
        TaskKind::Group => Arc::new(NoopAction::new("group")),
    };
    Ok(action)
}

/// Build the task registry for a validated config.
pub fn registry_from_config(
    cfg: &ConfigFile,
    cache: Arc<dyn TransformCache>,
) -> Result<TaskRegistry> {
    let mut defs = Vec::with_capacity(cfg.tasks().len());
    for (name, task) in cfg.tasks() {
        let mut def = TaskDefinition::new(name.clone(), action_for(task, &cache)?)
            .reload(task.effective_reload())
            .watch(default_watch(task), task.exclude.clone());
        def.deps = task.after.clone();
        defs.push(def);
    }
    TaskRegistry::from_definitions(defs)
}
