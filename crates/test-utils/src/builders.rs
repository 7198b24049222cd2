#![allow(dead_code)]

use std::collections::BTreeMap;

use assetpipe::config::{
    BuildSection, ConfigFile, ConfigSection, PathsSection, RawConfigFile, ServeSection, TaskConfig,
    TaskKind, TransformStep,
};
use assetpipe::errors::Result;
use assetpipe::types::{OutputRoots, ReloadKind, When};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                paths: PathsSection::default(),
                build: BuildSection::default(),
                serve: ServeSection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn behaviour(mut self, behaviour: &str) -> Self {
        self.config.config.triggered_while_running_behaviour = behaviour.to_string();
        self
    }

    pub fn keep_going(mut self, val: bool) -> Self {
        self.config.config.keep_going = val;
        self
    }

    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.config.config.debounce_ms = ms;
        self
    }

    pub fn build_tasks(mut self, tasks: &[&str]) -> Self {
        self.config.build.tasks = tasks.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build().expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            task: TaskConfig::new(kind),
        }
    }

    pub fn pipeline(src: &str) -> Self {
        Self::new(TaskKind::Pipeline).src(src)
    }

    pub fn bundle(entry: &str, output: &str) -> Self {
        let mut b = Self::new(TaskKind::Bundle);
        b.task.entry = Some(entry.to_string());
        b.task.output = Some(output.to_string());
        b
    }

    pub fn lint(src: &str) -> Self {
        Self::new(TaskKind::Lint).src(src)
    }

    pub fn command(cmd: &str) -> Self {
        Self::new(TaskKind::Command).cmd(cmd)
    }

    pub fn group() -> Self {
        Self::new(TaskKind::Group)
    }

    pub fn src(mut self, pattern: &str) -> Self {
        self.task.src.push(pattern.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn watch(mut self, pattern: &str) -> Self {
        self.task.watch.get_or_insert_with(Vec::new).push(pattern.to_string());
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.task.exclude.push(pattern.to_string());
        self
    }

    pub fn base(mut self, base: &str) -> Self {
        self.task.base = Some(base.to_string());
        self
    }

    pub fn dest(mut self, dest: &str) -> Self {
        self.task.dest = dest.to_string();
        self
    }

    pub fn step(mut self, step: TransformStep) -> Self {
        self.task.transform.push(step);
        self
    }

    pub fn only(mut self, when: When) -> Self {
        self.task.only = when;
        self
    }

    pub fn roots(mut self, roots: OutputRoots) -> Self {
        self.task.roots = roots;
        self
    }

    pub fn reload(mut self, reload: ReloadKind) -> Self {
        self.task.reload = Some(reload);
        self
    }

    pub fn cmd(mut self, cmd: &str) -> Self {
        self.task.cmd = Some(cmd.to_string());
        self
    }

    pub fn cache(mut self, val: bool) -> Self {
        self.task.cache = val;
        self
    }

    pub fn all_or_nothing(mut self, val: bool) -> Self {
        self.task.all_or_nothing = val;
        self
    }

    pub fn max_line_length(mut self, len: usize) -> Self {
        self.task.max_line_length = Some(len);
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
