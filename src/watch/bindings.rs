// src/watch/bindings.rs

//! Glob bindings from changed paths to tasks.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::dag::TaskRegistry;
use crate::engine::TaskName;
use crate::errors::Result;
use crate::fs::glob::PatternSet;
use crate::watch::dag_filter::has_dependent_in_matching;

/// `watch(globs, task)`: changes matching `patterns` re-run `task`.
#[derive(Debug, Clone)]
pub struct WatchBinding {
    task: TaskName,
    patterns: PatternSet,
}

impl WatchBinding {
    pub fn new(task: impl Into<TaskName>, globs: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            task: task.into(),
            patterns: PatternSet::new(globs, exclude)?,
        })
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn patterns(&self) -> &[String] {
        self.patterns.patterns()
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        self.patterns.matches(rel_path)
    }
}

/// All bindings of a watch session, plus the dependency lists needed to
/// filter matches.
#[derive(Debug, Clone, Default)]
pub struct WatchBindings {
    bindings: Vec<WatchBinding>,
    deps: HashMap<TaskName, Vec<TaskName>>,
}

impl WatchBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// One binding per registered task with watch globs.
    pub fn from_registry(registry: &TaskRegistry) -> Result<Self> {
        let mut bindings = Self::new();
        for def in registry.definitions() {
            bindings.deps.insert(def.name.clone(), def.deps.clone());
            if !def.watch.is_empty() {
                bindings.add(WatchBinding::new(def.name.clone(), &def.watch, &def.exclude)?);
            }
        }
        Ok(bindings)
    }

    /// Register a binding from `globs` to `task`.
    pub fn watch(&mut self, globs: &[String], task: impl Into<TaskName>) -> Result<()> {
        self.add(WatchBinding::new(task, globs, &[])?);
        Ok(())
    }

    pub fn add(&mut self, binding: WatchBinding) {
        debug!(task = %binding.task, patterns = ?binding.patterns(), "watch binding");
        self.bindings.push(binding);
    }

    /// Record that `task` depends on `deps`.
    pub fn set_deps(&mut self, task: impl Into<TaskName>, deps: Vec<TaskName>) {
        self.deps.insert(task.into(), deps);
    }

    pub fn bindings(&self) -> &[WatchBinding] {
        &self.bindings
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Tasks to trigger for a change of `rel_path`.
    ///
    /// A matching task is dropped if one of its dependents also matches,
    /// since running the dependent includes it. The result is sorted and
    /// free of duplicates.
    pub fn tasks_for(&self, rel_path: &str) -> Vec<TaskName> {
        let matching: HashSet<TaskName> = self
            .bindings
            .iter()
            .filter(|b| b.matches(rel_path))
            .map(|b| b.task.clone())
            .collect();

        let mut tasks: Vec<TaskName> = matching
            .iter()
            .filter(|t| !has_dependent_in_matching(t, &matching, &self.deps))
            .cloned()
            .collect();
        tasks.sort();
        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn globs(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn path_maps_to_matching_tasks() {
        let mut bindings = WatchBindings::new();
        bindings.watch(&globs(&["app/styles/**/*.scss"]), "styles").unwrap();
        bindings.watch(&globs(&["app/**/*.html"]), "markup").unwrap();

        assert_eq!(bindings.tasks_for("app/styles/base/_vars.scss"), vec!["styles"]);
        assert_eq!(bindings.tasks_for("app/index.html"), vec!["markup"]);
        assert!(bindings.tasks_for("README.md").is_empty());
    }

    #[test]
    fn dependent_wins_over_its_dependency() {
        let mut bindings = WatchBindings::new();
        bindings.watch(&globs(&["app/scripts/**/*.js"]), "lint").unwrap();
        bindings.watch(&globs(&["app/scripts/**/*.js"]), "scripts").unwrap();
        bindings.set_deps("scripts", vec!["lint".into()]);

        assert_eq!(bindings.tasks_for("app/scripts/main.js"), vec!["scripts"]);
    }

    #[test]
    fn excludes_apply_to_bindings() {
        let mut bindings = WatchBindings::new();
        bindings.add(
            WatchBinding::new("copy", &globs(&["app/*"]), &globs(&["app/*.html"])).unwrap(),
        );
        assert_eq!(bindings.tasks_for("app/robots.txt"), vec!["copy"]);
        assert!(bindings.tasks_for("app/index.html").is_empty());
    }
}
