// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::{CacheStorageMode, OutputRoots, ReloadKind, TriggerWhileRunningBehaviour, When};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// triggered_while_running_behaviour = "queue"
/// debounce_ms = 100
///
/// [paths]
/// source = "app"
/// staging = ".tmp"
/// output = "dist"
///
/// [task.styles]
/// kind = "pipeline"
/// src = ["app/styles/main.scss"]
/// dest = "styles"
/// watch = ["app/styles/**/*.scss"]
/// reload = "styles"
///
/// [[task.styles.transform]]
/// use = "minify-css"
/// when = "release"
/// ```
///
/// All sections except `[task.*]` are optional and have defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub paths: PathsSection,

    #[serde(default)]
    pub build: BuildSection,

    #[serde(default)]
    pub serve: ServeSection,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated configuration.
///
/// Construct it with `ConfigFile::try_from(raw)`; the conversion runs every
/// check in [`crate::config::validate`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    raw: RawConfigFile,
    behaviour: TriggerWhileRunningBehaviour,
}

impl ConfigFile {
    pub(crate) fn from_validated(raw: RawConfigFile, behaviour: TriggerWhileRunningBehaviour) -> Self {
        Self { raw, behaviour }
    }

    pub fn config_section(&self) -> &ConfigSection {
        &self.raw.config
    }

    pub fn paths(&self) -> &PathsSection {
        &self.raw.paths
    }

    pub fn build_section(&self) -> &BuildSection {
        &self.raw.build
    }

    pub fn serve_section(&self) -> &ServeSection {
        &self.raw.serve
    }

    pub fn tasks(&self) -> &BTreeMap<String, TaskConfig> {
        &self.raw.task
    }

    pub fn behaviour(&self) -> TriggerWhileRunningBehaviour {
        self.behaviour
    }

    pub fn raw(&self) -> &RawConfigFile {
        &self.raw
    }
}

/// `[config]` section: runtime behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// `"queue"` (default) or `"cancel"`.
    #[serde(default = "default_triggered_while_running_behaviour")]
    pub triggered_while_running_behaviour: String,

    /// Maximum number of queued runs to remember while a run is active.
    #[serde(default = "default_queue_length")]
    pub queue_length: usize,

    /// Debounce window for filesystem events, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// If true, a failing task only fails its dependents; unrelated branches
    /// keep running. Otherwise no new task starts after the first failure.
    #[serde(default)]
    pub keep_going: bool,

    /// Where memoised transform outputs live.
    #[serde(default)]
    pub cache_storage: CacheStorageMode,
}

fn default_triggered_while_running_behaviour() -> String {
    "queue".to_string()
}

fn default_queue_length() -> usize {
    1
}

fn default_debounce_ms() -> u64 {
    100
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            triggered_while_running_behaviour: default_triggered_while_running_behaviour(),
            queue_length: default_queue_length(),
            debounce_ms: default_debounce_ms(),
            keep_going: false,
            cache_storage: CacheStorageMode::default(),
        }
    }
}

/// `[paths]` section: conventional project layout, relative to the config
/// file's directory.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    #[serde(default = "default_source")]
    pub source: String,

    /// Intermediate / debug output root.
    #[serde(default = "default_staging")]
    pub staging: String,

    /// Final / release output root.
    #[serde(default = "default_output")]
    pub output: String,

    /// Entries directly under the output root that `clean` must not remove.
    #[serde(default = "default_keep")]
    pub keep: Vec<String>,
}

fn default_source() -> String {
    "app".to_string()
}

fn default_staging() -> String {
    ".tmp".to_string()
}

fn default_output() -> String {
    "dist".to_string()
}

fn default_keep() -> Vec<String> {
    vec![".git".to_string()]
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            source: default_source(),
            staging: default_staging(),
            output: default_output(),
            keep: default_keep(),
        }
    }
}

/// `[build]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BuildSection {
    /// Tasks run by `assetpipe build` when none are named. Empty means every
    /// task without dependents.
    #[serde(default)]
    pub tasks: Vec<String>,
}

/// `[serve]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServeSection {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Port used when previewing the release output.
    #[serde(default = "default_dist_port")]
    pub dist_port: u16,

    /// Directories served in debug mode, first match wins. Defaults to the
    /// `[paths]` staging and source roots.
    #[serde(default)]
    pub roots: Option<Vec<String>>,

    /// Tasks built before the debug server starts.
    #[serde(default)]
    pub tasks: Vec<String>,
}

fn default_port() -> u16 {
    3000
}

fn default_dist_port() -> u16 {
    3001
}

impl Default for ServeSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            dist_port: default_dist_port(),
            roots: None,
            tasks: Vec::new(),
        }
    }
}

/// What a task does when it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Enumerate `src`, run the transform chain, write under `dest`.
    Pipeline,
    /// Run an external bundler for `entry`, post-process, write `output`.
    Bundle,
    /// Check `src` files against the built-in rules (or run `cmd`).
    Lint,
    /// Run a shell command.
    Command,
    /// Do nothing but report success, so bound watchers can reload clients.
    Reload,
    /// Do nothing; exists to name a set of dependencies.
    Group,
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub kind: TaskKind,

    /// Dependency list: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Input globs, relative to the project root.
    #[serde(default)]
    pub src: Vec<String>,

    /// Globs removed from both `src` and `watch` matches.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Directory input paths are made relative to. Defaults to the static
    /// prefix of the first `src` pattern.
    #[serde(default)]
    pub base: Option<String>,

    /// Sub-directory under the output root(s).
    #[serde(default)]
    pub dest: String,

    /// Transform chain, applied in order.
    #[serde(default)]
    pub transform: Vec<TransformStep>,

    /// If any file fails, write nothing for this task.
    #[serde(default)]
    pub all_or_nothing: bool,

    /// Memoise cacheable transform steps by content hash.
    #[serde(default)]
    pub cache: bool,

    #[serde(default)]
    pub roots: OutputRoots,

    /// Restrict the task to one mode; in the other mode it succeeds without
    /// doing anything.
    #[serde(default)]
    pub only: When,

    /// Globs that re-trigger this task in watch mode.
    #[serde(default)]
    pub watch: Option<Vec<String>>,

    /// Reload notification sent after success. Defaults depend on `kind`.
    #[serde(default)]
    pub reload: Option<ReloadKind>,

    /// Shell command for `command` tasks, external linters and bundlers.
    /// `{entry}` is replaced with the bundle entry path.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Bundle entry point, relative to the project root.
    #[serde(default)]
    pub entry: Option<String>,

    /// Bundle output path, relative to the output root.
    #[serde(default)]
    pub output: Option<String>,

    /// Lint: maximum line length (0 disables the rule).
    #[serde(default)]
    pub max_line_length: Option<usize>,
}

impl TaskConfig {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            after: Vec::new(),
            src: Vec::new(),
            exclude: Vec::new(),
            base: None,
            dest: String::new(),
            transform: Vec::new(),
            all_or_nothing: false,
            cache: false,
            roots: OutputRoots::default(),
            only: When::default(),
            watch: None,
            reload: None,
            cmd: None,
            entry: None,
            output: None,
            max_line_length: None,
        }
    }

    /// Reload kind after applying per-kind defaults.
    pub fn effective_reload(&self) -> ReloadKind {
        self.reload.unwrap_or(match self.kind {
            TaskKind::Pipeline | TaskKind::Reload => ReloadKind::Page,
            TaskKind::Bundle => ReloadKind::Scripts,
            TaskKind::Lint | TaskKind::Command | TaskKind::Group => ReloadKind::None,
        })
    }
}

/// Built-in transform names, as written in `use = "..."`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformName {
    MinifyCss,
    MinifyJs,
    MinifyHtml,
    OptimizeImage,
    Sourcemap,
    Rename,
    Command,
}

/// One `[[task.<name>.transform]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TransformStep {
    #[serde(rename = "use")]
    pub name: TransformName,

    #[serde(default)]
    pub when: When,

    /// `command`: shell command reading stdin, writing stdout.
    #[serde(default)]
    pub cmd: Option<String>,

    /// `rename` / `command`: new file extension (without the dot).
    #[serde(default)]
    pub ext: Option<String>,

    /// `minify-js`: keep `/*! ... */` license comments. Defaults to true.
    #[serde(default)]
    pub preserve_comments: Option<bool>,
}

impl TransformStep {
    pub fn new(name: TransformName) -> Self {
        Self {
            name,
            when: When::Always,
            cmd: None,
            ext: None,
            preserve_comments: None,
        }
    }

    pub fn when(mut self, when: When) -> Self {
        self.when = when;
        self
    }
}
