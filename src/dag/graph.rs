// src/dag/graph.rs

use std::collections::{BTreeSet, HashMap};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::engine::TaskName;
use crate::errors::{AssetpipeError, Result};

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Direct dependencies: tasks that must complete before this one can run.
    deps: Vec<TaskName>,
    /// Direct dependents: tasks that depend on this one.
    dependents: Vec<TaskName>,
}

/// In-memory task graph keyed by task name.
///
/// Construction does not reject cycles; [`DagGraph::topological_order`]
/// does, and the registry calls it before anything runs.
#[derive(Debug, Clone, Default)]
pub struct DagGraph {
    nodes: HashMap<TaskName, DagNode>,
}

impl DagGraph {
    /// Build a graph from `(task, dependencies)` pairs.
    ///
    /// Dependencies that are not themselves listed as tasks are kept on the
    /// dependent's `deps` list but get no node of their own.
    pub fn from_edges<'a, I, D>(tasks: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, D)>,
        D: IntoIterator<Item = &'a str>,
    {
        let mut nodes: HashMap<TaskName, DagNode> = HashMap::new();

        // First pass: create nodes with their dependency lists.
        for (name, deps) in tasks {
            nodes.insert(
                name.to_string(),
                DagNode {
                    deps: deps.into_iter().map(str::to_string).collect(),
                    dependents: Vec::new(),
                },
            );
        }

        // Second pass: populate dependents based on deps.
        let task_names: Vec<TaskName> = nodes.keys().cloned().collect();
        for task_name in task_names {
            let deps = nodes
                .get(&task_name)
                .map(|n| n.deps.clone())
                .unwrap_or_default();

            for dep in deps {
                if let Some(dep_node) = nodes.get_mut(&dep) {
                    dep_node.dependents.push(task_name.clone());
                }
            }
        }

        Self { nodes }
    }

    /// Return all task names.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Immediate dependencies of a task (the tasks listed in its `after`).
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task (tasks that list this one in their `after`).
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// The given tasks plus everything they transitively depend on.
    pub fn dependency_closure<S: AsRef<str>>(&self, roots: &[S]) -> BTreeSet<TaskName> {
        let mut closure = BTreeSet::new();
        let mut stack: Vec<&str> = roots.iter().map(|r| r.as_ref()).collect();

        while let Some(name) = stack.pop() {
            if !closure.insert(name.to_string()) {
                continue;
            }
            stack.extend(self.dependencies_of(name).iter().map(String::as_str));
        }

        closure
    }

    /// True if `ancestor` is a transitive dependency of `task`.
    pub fn depends_on(&self, task: &str, ancestor: &str) -> bool {
        task != ancestor && self.dependency_closure(&[task]).contains(ancestor)
    }

    /// Topological order (dependencies first) of the sub-graph induced by
    /// `subset`, or of the whole graph when `subset` is `None`.
    ///
    /// Fails with `DagCycle` if the (sub-)graph contains a cycle.
    pub fn topological_order(&self, subset: Option<&BTreeSet<TaskName>>) -> Result<Vec<TaskName>> {
        let included = |name: &str| subset.is_none_or(|s| s.contains(name));

        // Edge direction: dep -> task.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        let mut names: Vec<&str> = self.tasks().filter(|n| included(n)).collect();
        names.sort_unstable();

        for &name in &names {
            graph.add_node(name);
        }
        for &name in &names {
            for dep in self.dependencies_of(name) {
                if included(dep) {
                    graph.add_edge(dep.as_str(), name, ());
                }
            }
        }

        match toposort(&graph, None) {
            Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
            Err(cycle) => Err(AssetpipeError::DagCycle(format!(
                "cycle detected in task graph involving task '{}'",
                cycle.node_id()
            ))),
        }
    }
}
