// src/actions/pipeline.rs

//! File pipeline: enumerate inputs, run the chain, write outputs.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use tracing::{debug, error, info, warn};

use crate::actions::{ActionFuture, BuildEnv, TaskAction, TaskContext, TaskReport};
use crate::config::TaskConfig;
use crate::errors::{AssetpipeError, Result, TransformError};
use crate::fs::glob::{PatternSet, glob_base};
use crate::transform::{Asset, ChainStep, TransformCache, TransformChain};
use crate::types::{OutputRoots, When};

/// Static description of a pipeline task.
#[derive(Debug, Clone)]
pub struct PipelineSpec {
    pub src: Vec<String>,
    pub exclude: Vec<String>,
    /// Inputs are made relative to this directory; defaults to the glob base
    /// of the first `src` pattern.
    pub base: Option<PathBuf>,
    pub dest: PathBuf,
    pub steps: Vec<ChainStep>,
    pub all_or_nothing: bool,
    pub cache: Option<Arc<dyn TransformCache>>,
    pub roots: OutputRoots,
    pub only: When,
}

impl PipelineSpec {
    pub fn new<S: Into<String>>(src: impl IntoIterator<Item = S>) -> Self {
        Self {
            src: src.into_iter().map(Into::into).collect(),
            exclude: Vec::new(),
            base: None,
            dest: PathBuf::new(),
            steps: Vec::new(),
            all_or_nothing: false,
            cache: None,
            roots: OutputRoots::Mode,
            only: When::Always,
        }
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    pub fn base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn dest(mut self, dest: impl Into<PathBuf>) -> Self {
        self.dest = dest.into();
        self
    }

    pub fn step(mut self, step: ChainStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn all_or_nothing(mut self, value: bool) -> Self {
        self.all_or_nothing = value;
        self
    }

    pub fn cache(mut self, cache: Arc<dyn TransformCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn roots(mut self, roots: OutputRoots) -> Self {
        self.roots = roots;
        self
    }

    pub fn only(mut self, only: When) -> Self {
        self.only = only;
        self
    }

    fn effective_base(&self) -> PathBuf {
        match (&self.base, self.src.first()) {
            (Some(base), _) => base.clone(),
            (None, Some(first)) => glob_base(first),
            (None, None) => PathBuf::new(),
        }
    }
}

/// Output written for each input, per output root. Lets a later run remove
/// outputs whose input disappeared.
type Manifest = HashMap<PathBuf, BTreeMap<PathBuf, PathBuf>>;

/// A task that runs [`PipelineSpec`] on the blocking thread pool.
#[derive(Debug)]
pub struct PipelineAction {
    spec: Arc<PipelineSpec>,
    patterns: Arc<PatternSet>,
    manifest: Arc<Mutex<Manifest>>,
}

impl PipelineAction {
    pub fn new(spec: PipelineSpec) -> Result<Self> {
        let patterns = PatternSet::new(&spec.src, &spec.exclude)?;
        Ok(Self {
            spec: Arc::new(spec),
            patterns: Arc::new(patterns),
            manifest: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn from_config(task: &TaskConfig, cache: Arc<dyn TransformCache>) -> Result<Self> {
        let mut spec = PipelineSpec::new(task.src.iter().cloned())
            .dest(&task.dest)
            .all_or_nothing(task.all_or_nothing)
            .roots(task.roots)
            .only(task.only);
        spec.exclude = task.exclude.clone();
        spec.base = task.base.as_ref().map(PathBuf::from);
        spec.steps = task.transform.iter().map(ChainStep::from_config).collect();
        if task.cache {
            spec.cache = Some(cache);
        }
        Self::new(spec)
    }

    pub fn spec(&self) -> &PipelineSpec {
        &self.spec
    }
}

impl TaskAction for PipelineAction {
    fn describe(&self) -> String {
        let ids: Vec<String> = self
            .spec
            .steps
            .iter()
            .map(|s| match s.when {
                When::Always => s.transform.id(),
                When::Release => format!("{} (release)", s.transform.id()),
                When::Debug => format!("{} (debug)", s.transform.id()),
            })
            .collect();
        let chain = if ids.is_empty() {
            "copy".to_string()
        } else {
            ids.join(" -> ")
        };
        format!("pipeline {:?} [{chain}] -> {:?}", self.spec.src, self.spec.dest)
    }

    fn run<'a>(&'a self, ctx: &'a TaskContext) -> ActionFuture<'a> {
        Box::pin(async move {
            if !self.spec.only.applies(ctx.mode().release) {
                debug!(task = %ctx.task, "task disabled in this mode");
                return Ok(TaskReport::default());
            }

            let spec = Arc::clone(&self.spec);
            let patterns = Arc::clone(&self.patterns);
            let manifest = Arc::clone(&self.manifest);
            let env = ctx.env.clone();
            let task = ctx.task.clone();

            tokio::task::spawn_blocking(move || {
                run_pipeline(&task, &spec, &patterns, &manifest, &env)
            })
            .await
            .map_err(|e| anyhow!("pipeline worker for '{}' failed: {e}", ctx.task))?
        })
    }
}

/// Synchronous body of a pipeline run.
pub fn run_pipeline(
    task: &str,
    spec: &PipelineSpec,
    patterns: &PatternSet,
    manifest: &Mutex<Manifest>,
    env: &BuildEnv,
) -> Result<TaskReport> {
    let root = &env.paths.root;
    let fs = env.fs.as_ref();

    let inputs = patterns.collect(fs, root)?;
    let base = spec.effective_base();

    let mut chain = TransformChain::for_mode(task, &spec.steps, env.mode);
    if let Some(cache) = &spec.cache {
        chain = chain.with_cache(Arc::clone(cache));
    }

    debug!(task = %task, inputs = inputs.len(), chain = ?chain.ids(), "running pipeline");

    let mut produced: Vec<(PathBuf, Asset)> = Vec::new();
    let mut failures: Vec<TransformError> = Vec::new();
    for input in &inputs {
        match process_file(&chain, root, &base, input, fs) {
            Ok(asset) => produced.push((input.clone(), asset)),
            Err(err) => {
                error!(
                    task = %task,
                    transform = %err.transform,
                    path = %err.path.display(),
                    "{}",
                    err.message
                );
                failures.push(err);
            }
        }
    }

    let failed_inputs: BTreeSet<PathBuf> = inputs
        .iter()
        .filter(|i| !produced.iter().any(|(p, _)| p == *i))
        .cloned()
        .collect();

    if spec.all_or_nothing && !failures.is_empty() {
        warn!(task = %task, failed = failures.len(), "all_or_nothing: writing no outputs");
        return Err(AssetpipeError::TransformFailures {
            task: task.to_string(),
            failed: failures.len(),
            total: inputs.len(),
        });
    }

    let mut report = TaskReport::default();
    let mut manifest = manifest.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    for dest_root in env.paths.dest_roots(env.mode, spec.roots) {
        let out_dir = dest_root.join(&spec.dest);
        let previous = manifest.remove(&dest_root).unwrap_or_default();
        let mut current: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();

        for (input, asset) in &produced {
            let out_path = out_dir.join(&asset.path);
            env.locks.write(fs, &out_path, &asset.contents)?;
            report.written.push(out_path.clone());
            current.insert(input.clone(), out_path);
        }

        for (input, old_out) in previous {
            if failed_inputs.contains(&input) {
                // Keep the last good output of a file that failed this time.
                current.entry(input).or_insert(old_out);
                continue;
            }
            let still_written = current.get(&input) == Some(&old_out);
            if !still_written && env.locks.remove(fs, &old_out)? {
                debug!(task = %task, path = %old_out.display(), "removed stale output");
                report.removed.push(old_out);
            }
        }

        manifest.insert(dest_root, current);
    }
    drop(manifest);

    if !failures.is_empty() {
        return Err(AssetpipeError::TransformFailures {
            task: task.to_string(),
            failed: failures.len(),
            total: inputs.len(),
        });
    }

    if inputs.is_empty() {
        info!(task = %task, patterns = ?spec.src, "no input files matched");
    }
    Ok(report)
}

fn process_file(
    chain: &TransformChain,
    root: &Path,
    base: &Path,
    input: &Path,
    fs: &dyn crate::fs::FileSystem,
) -> std::result::Result<Asset, TransformError> {
    let contents = fs
        .read(&root.join(input))
        .map_err(|e| TransformError::new("read", input, format!("{e:#}")))?;
    let rel = input.strip_prefix(base).unwrap_or(input);
    chain
        .apply(Asset::new(rel, contents))
        .map_err(|e| TransformError { path: input.to_path_buf(), ..e })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectPaths;
    use crate::fs::FileSystem;
    use crate::fs::mock::MockFileSystem;
    use crate::mode::BuildMode;
    use crate::transform::builtin::{MinifyCss, Rename, Sourcemap};

    fn env(fs: &MockFileSystem, mode: BuildMode) -> BuildEnv {
        BuildEnv::new(mode, ProjectPaths::conventional("/p"), Arc::new(fs.clone()))
    }

    fn styles() -> PipelineAction {
        let spec = PipelineSpec::new(["app/styles/**/*.css"])
            .dest("styles")
            .step(ChainStep::when(When::Release, Arc::new(MinifyCss)))
            .step(ChainStep::when(When::Debug, Arc::new(Sourcemap)));
        PipelineAction::new(spec).unwrap()
    }

    #[tokio::test]
    async fn release_and_debug_write_to_their_roots() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/app/styles/main.css", "body {\n  color: red;\n}\n");
        let action = styles();

        let release = env(&fs, BuildMode::release());
        action.run(&release.context("styles", 1)).await.unwrap();
        let out = fs.contents("/p/dist/styles/main.css").unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "body{color:red}");

        let debug = env(&fs, BuildMode::debug());
        action.run(&debug.context("styles", 2)).await.unwrap();
        let out = String::from_utf8(fs.contents("/p/.tmp/styles/main.css").unwrap()).unwrap();
        assert!(out.starts_with("body {\n  color: red;\n}"));
        assert!(out.contains("sourceMappingURL="));
    }

    #[tokio::test]
    async fn failing_file_does_not_stop_siblings() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/app/styles/good.css", "a { }");
        fs.add_file("/p/app/styles/bad.css", vec![0xff, 0xfe]);
        let action = styles();

        let err = action
            .run(&env(&fs, BuildMode::release()).context("styles", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AssetpipeError::TransformFailures { failed: 1, total: 2, .. }));
        assert!(fs.contents("/p/dist/styles/good.css").is_some());
        assert!(fs.contents("/p/dist/styles/bad.css").is_none());
    }

    #[tokio::test]
    async fn all_or_nothing_writes_nothing_on_failure() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/app/styles/good.css", "a { }");
        fs.add_file("/p/app/styles/bad.css", vec![0xff]);
        let spec = PipelineSpec::new(["app/styles/*.css"])
            .step(ChainStep::always(Arc::new(MinifyCss)))
            .all_or_nothing(true);
        let action = PipelineAction::new(spec).unwrap();

        assert!(action.run(&env(&fs, BuildMode::debug()).context("css", 1)).await.is_err());
        assert!(fs.contents("/p/.tmp/good.css").is_none());
    }

    #[tokio::test]
    async fn deleted_input_removes_its_output() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/app/a.txt", "a");
        fs.add_file("/p/app/b.txt", "b");
        let action = PipelineAction::new(PipelineSpec::new(["app/*.txt"])).unwrap();
        let env = env(&fs, BuildMode::debug());

        action.run(&env.context("copy", 1)).await.unwrap();
        assert!(fs.contents("/p/.tmp/b.txt").is_some());

        fs.remove_file(Path::new("/p/app/b.txt")).unwrap();
        let report = action.run(&env.context("copy", 2)).await.unwrap();
        assert_eq!(report.removed, vec![PathBuf::from("/p/.tmp/b.txt")]);
        assert!(fs.contents("/p/.tmp/b.txt").is_none());
        assert!(fs.contents("/p/.tmp/a.txt").is_some());
    }

    #[tokio::test]
    async fn empty_match_succeeds_and_rename_changes_output_name() {
        let fs = MockFileSystem::new();
        let spec =
            PipelineSpec::new(["app/*.scss"]).step(ChainStep::always(Arc::new(Rename::new("css"))));
        let action = PipelineAction::new(spec).unwrap();
        let env = env(&fs, BuildMode::debug());

        let report = action.run(&env.context("styles", 1)).await.unwrap();
        assert!(report.written.is_empty());

        fs.add_file("/p/app/main.scss", "a{}");
        action.run(&env.context("styles", 2)).await.unwrap();
        assert!(fs.contents("/p/.tmp/main.css").is_some());
    }

    #[tokio::test]
    async fn only_release_is_a_noop_in_debug() {
        let fs = MockFileSystem::new();
        fs.add_file("/p/app/index.html", "<p> x </p>");
        let spec = PipelineSpec::new(["app/*.html"]).only(When::Release);
        let action = PipelineAction::new(spec).unwrap();

        let report = action.run(&env(&fs, BuildMode::debug()).context("html", 1)).await.unwrap();
        assert_eq!(report, TaskReport::default());
        assert_eq!(fs.file_paths().len(), 1);
    }
}
