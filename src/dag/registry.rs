// src/dag/registry.rs

//! Named tasks, their dependencies and actions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::actions::TaskAction;
use crate::dag::graph::DagGraph;
use crate::engine::TaskName;
use crate::errors::{AssetpipeError, Result};
use crate::types::ReloadKind;

/// A registered task: name, direct dependencies, action and watch metadata.
#[derive(Clone)]
pub struct TaskDefinition {
    pub name: TaskName,
    pub deps: Vec<TaskName>,
    pub action: Arc<dyn TaskAction>,
    pub reload: ReloadKind,
    /// Globs that re-trigger this task in a watch session.
    pub watch: Vec<String>,
    /// Globs excluded from `watch`.
    pub exclude: Vec<String>,
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("name", &self.name)
            .field("deps", &self.deps)
            .field("reload", &self.reload)
            .field("watch", &self.watch)
            .finish_non_exhaustive()
    }
}

impl TaskDefinition {
    pub fn new(name: impl Into<TaskName>, action: Arc<dyn TaskAction>) -> Self {
        Self {
            name: name.into(),
            deps: Vec::new(),
            action,
            reload: ReloadKind::None,
            watch: Vec::new(),
            exclude: Vec::new(),
        }
    }

    pub fn after(mut self, dep: impl Into<TaskName>) -> Self {
        self.deps.push(dep.into());
        self
    }

    pub fn reload(mut self, reload: ReloadKind) -> Self {
        self.reload = reload;
        self
    }

    pub fn watch(mut self, patterns: Vec<String>, exclude: Vec<String>) -> Self {
        self.watch = patterns;
        self.exclude = exclude;
        self
    }
}

/// Dependency-ordered execution plan for a set of requested tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// The tasks that were asked for.
    pub requested: Vec<TaskName>,
    /// Requested tasks plus their transitive dependencies, dependencies first.
    pub order: Vec<TaskName>,
}

/// Registry of build tasks.
///
/// Registration is validated eagerly: a name can be registered once, and only
/// after all of its dependencies. That makes a registry built one task at a
/// time acyclic by construction; [`TaskRegistry::from_definitions`] handles
/// unordered batches and rejects cycles explicitly.
#[derive(Debug, Default, Clone)]
pub struct TaskRegistry {
    tasks: BTreeMap<TaskName, TaskDefinition>,
    /// Names in registration order.
    order: Vec<TaskName>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` with the given dependencies and action.
    pub fn register<N, D>(&mut self, name: N, deps: D, action: Arc<dyn TaskAction>) -> Result<()>
    where
        N: Into<TaskName>,
        D: IntoIterator,
        D::Item: Into<TaskName>,
    {
        let mut def = TaskDefinition::new(name, action);
        def.deps = deps.into_iter().map(Into::into).collect();
        self.register_definition(def)
    }

    /// Register a fully described task.
    pub fn register_definition(&mut self, def: TaskDefinition) -> Result<()> {
        if self.tasks.contains_key(&def.name) {
            return Err(AssetpipeError::DuplicateTask(def.name));
        }
        if let Some(missing) = def.deps.iter().find(|d| !self.tasks.contains_key(*d)) {
            return Err(AssetpipeError::UnknownDependency {
                task: def.name.clone(),
                dependency: missing.clone(),
            });
        }

        debug!(task = %def.name, deps = ?def.deps, "registered task");
        self.order.push(def.name.clone());
        self.tasks.insert(def.name.clone(), def);
        Ok(())
    }

    /// Build a registry from definitions given in any order.
    ///
    /// Unknown dependencies fail with `UnknownDependency`, cycles with
    /// `DagCycle`; otherwise tasks are registered in dependency order.
    pub fn from_definitions(defs: Vec<TaskDefinition>) -> Result<Self> {
        let mut by_name: BTreeMap<TaskName, TaskDefinition> = BTreeMap::new();
        for def in defs {
            if by_name.contains_key(&def.name) {
                return Err(AssetpipeError::DuplicateTask(def.name));
            }
            by_name.insert(def.name.clone(), def);
        }

        for def in by_name.values() {
            if let Some(missing) = def.deps.iter().find(|d| !by_name.contains_key(*d)) {
                return Err(AssetpipeError::UnknownDependency {
                    task: def.name.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        let graph = DagGraph::from_edges(
            by_name
                .values()
                .map(|d| (d.name.as_str(), d.deps.iter().map(String::as_str))),
        );
        let order = graph.topological_order(None)?;

        let mut registry = Self::new();
        for name in order {
            if let Some(def) = by_name.remove(&name) {
                registry.register_definition(def)?;
            }
        }
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&TaskDefinition> {
        self.tasks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Task names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.order.iter().filter_map(|n| self.tasks.get(n))
    }

    /// Tasks nothing else depends on.
    pub fn leaves(&self) -> Vec<TaskName> {
        let graph = self.graph();
        self.names()
            .filter(|n| graph.dependents_of(n).is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Adjacency view used by the scheduler and the watcher.
    pub fn graph(&self) -> DagGraph {
        DagGraph::from_edges(
            self.tasks
                .values()
                .map(|d| (d.name.as_str(), d.deps.iter().map(String::as_str))),
        )
    }

    /// Resolve `names` into a dependency-ordered plan.
    ///
    /// Fails with `UnknownTask` for names that are not registered and with
    /// `DagCycle` if the dependency closure contains a cycle.
    pub fn plan<S: AsRef<str>>(&self, names: &[S]) -> Result<ExecutionPlan> {
        for name in names {
            if !self.contains(name.as_ref()) {
                return Err(AssetpipeError::UnknownTask(name.as_ref().to_string()));
            }
        }

        let graph = self.graph();
        let closure = graph.dependency_closure(names);
        let order = graph.topological_order(Some(&closure))?;

        Ok(ExecutionPlan {
            requested: names.iter().map(|n| n.as_ref().to_string()).collect(),
            order,
        })
    }
}
