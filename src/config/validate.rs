// src/config/validate.rs

use std::str::FromStr;

use globset::Glob;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile, TaskConfig, TaskKind, TransformName};
use crate::errors::{AssetpipeError, Result};
use crate::types::TriggerWhileRunningBehaviour;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = AssetpipeError;

    fn try_from(raw: RawConfigFile) -> Result<Self> {
        let behaviour = validate_config(&raw)?;
        Ok(ConfigFile::from_validated(raw, behaviour))
    }
}

/// Run semantic validation against a deserialized configuration.
///
/// This checks:
/// - there is at least one task
/// - `triggered_while_running_behaviour` is valid and `queue_length >= 1`
/// - every task has the fields its `kind` needs, and all globs compile
/// - `[build].tasks` / `[serve].tasks` name existing tasks
/// - all `after` dependencies refer to existing tasks
/// - the task graph has no cycles
///
/// Returns the parsed trigger behaviour so callers don't parse it twice.
pub fn validate_config(cfg: &RawConfigFile) -> Result<TriggerWhileRunningBehaviour> {
    ensure_has_tasks(cfg)?;
    let behaviour = validate_global_config(cfg)?;
    for (name, task) in cfg.task.iter() {
        validate_task(name, task)?;
    }
    validate_task_lists(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(behaviour)
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(AssetpipeError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<TriggerWhileRunningBehaviour> {
    let behaviour = TriggerWhileRunningBehaviour::from_str(
        &cfg.config.triggered_while_running_behaviour,
    )
    .map_err(|e| AssetpipeError::ConfigError(format!("[config]: {e}")))?;

    if cfg.config.queue_length == 0 {
        return Err(AssetpipeError::ConfigError(
            "[config].queue_length must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(behaviour)
}

fn validate_task(name: &str, task: &TaskConfig) -> Result<()> {
    let missing = |field: &str| {
        AssetpipeError::ConfigError(format!(
            "task '{name}' of kind {:?} requires `{field}`",
            task.kind
        ))
    };

    match task.kind {
        TaskKind::Pipeline if task.src.is_empty() => return Err(missing("src")),
        TaskKind::Bundle if task.entry.is_none() => return Err(missing("entry")),
        TaskKind::Bundle if task.output.is_none() => return Err(missing("output")),
        TaskKind::Command if task.cmd.is_none() => return Err(missing("cmd")),
        TaskKind::Lint if task.src.is_empty() && task.cmd.is_none() => {
            return Err(missing("src"));
        }
        _ => {}
    }

    let watch = task.watch.iter().flatten();
    for pattern in task.src.iter().chain(task.exclude.iter()).chain(watch) {
        Glob::new(pattern).map_err(|e| {
            AssetpipeError::ConfigError(format!(
                "task '{name}' has invalid glob pattern '{pattern}': {e}"
            ))
        })?;
    }

    for (idx, step) in task.transform.iter().enumerate() {
        let problem = match step.name {
            TransformName::Command if step.cmd.is_none() => Some("`command` step requires `cmd`"),
            TransformName::Rename if step.ext.is_none() => Some("`rename` step requires `ext`"),
            _ => None,
        };
        if let Some(problem) = problem {
            return Err(AssetpipeError::ConfigError(format!(
                "task '{name}' transform #{}: {problem}",
                idx + 1
            )));
        }
    }

    Ok(())
}

fn validate_task_lists(cfg: &RawConfigFile) -> Result<()> {
    let lists = [("[build].tasks", &cfg.build.tasks), ("[serve].tasks", &cfg.serve.tasks)];
    for (section, names) in lists {
        for name in names {
            if !cfg.task.contains_key(name) {
                return Err(AssetpipeError::ConfigError(format!(
                    "{section} references unknown task '{name}'"
                )));
            }
        }
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if dep == name {
                return Err(AssetpipeError::DagCycle(format!(
                    "task '{name}' cannot depend on itself in `after`"
                )));
            }
            if !cfg.task.contains_key(dep) {
                return Err(AssetpipeError::UnknownDependency {
                    task: name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> task. For `[task.B] after = ["A"]` we add A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(AssetpipeError::DagCycle(format!(
            "cycle detected in task graph involving task '{}'",
            cycle.node_id()
        ))),
    }
}
