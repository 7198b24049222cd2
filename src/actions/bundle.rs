// src/actions/bundle.rs

//! Script bundling through an external bundler.
//!
//! The bundler is a shell command that writes the bundled script for
//! `{entry}` to stdout. Its output then goes through the task's transform
//! chain (typically `minify-js` in release, `sourcemap` in debug) and is
//! written to `output` under the destination root.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, error, info};

use crate::actions::command::capture;
use crate::actions::{ActionFuture, TaskAction, TaskContext, TaskReport};
use crate::config::TaskConfig;
use crate::errors::{AssetpipeError, Result};
use crate::transform::{Asset, ChainStep, TransformChain};

/// Default bundler when a `bundle` task has no `cmd`.
pub const DEFAULT_BUNDLER: &str = "npx browserify {entry}";

#[derive(Debug, Clone)]
pub struct BundleAction {
    entry: String,
    output: PathBuf,
    cmd: String,
    steps: Arc<Vec<ChainStep>>,
}

impl BundleAction {
    pub fn new(entry: impl Into<String>, output: impl Into<PathBuf>, cmd: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            output: output.into(),
            cmd: cmd.into(),
            steps: Arc::new(Vec::new()),
        }
    }

    pub fn with_steps(mut self, steps: Vec<ChainStep>) -> Self {
        self.steps = Arc::new(steps);
        self
    }

    pub fn from_config(task: &TaskConfig) -> Self {
        let entry = task.entry.clone().unwrap_or_default();
        let output = task.output.clone().unwrap_or_else(|| entry.clone());
        let cmd = task.cmd.clone().unwrap_or_else(|| DEFAULT_BUNDLER.to_string());
        Self::new(entry, output, cmd)
            .with_steps(task.transform.iter().map(ChainStep::from_config).collect())
    }

    /// Bundler command with `{entry}` substituted.
    pub fn command_line(&self) -> String {
        self.cmd.replace("{entry}", &self.entry)
    }
}

impl TaskAction for BundleAction {
    fn describe(&self) -> String {
        format!("bundle {} -> {}", self.entry, self.output.display())
    }

    fn run<'a>(&'a self, ctx: &'a TaskContext) -> ActionFuture<'a> {
        Box::pin(async move {
            let cmd = self.command_line();
            debug!(task = %ctx.task, cmd = %cmd, "running bundler");

            let (status, stdout, stderr) =
                capture(&ctx.task, &cmd, &ctx.paths().root, ctx.mode()).await?;
            if !status.success() {
                let detail = stderr.lines().last().unwrap_or("").trim().to_string();
                error!(task = %ctx.task, entry = %self.entry, "bundler failed: {}", detail);
                return Err(AssetpipeError::Bundle(format!(
                    "`{cmd}` exited with code {}: {detail}",
                    status.code().unwrap_or(-1)
                )));
            }

            let chain = TransformChain::for_mode(&ctx.task, &self.steps, ctx.mode());
            let asset = Asset::new(&self.output, stdout);
            let task = ctx.task.clone();
            let bundled = tokio::task::spawn_blocking(move || chain.apply(asset))
                .await
                .map_err(|e| anyhow!("bundle worker for '{task}' failed: {e}"))?
                .map_err(|e| AssetpipeError::Bundle(e.to_string()))?;

            let out_path = ctx.paths().dest_root(ctx.mode()).join(&bundled.path);
            ctx.env.locks.write(ctx.fs(), &out_path, &bundled.contents)?;
            info!(
                task = %ctx.task,
                path = %out_path.display(),
                bytes = bundled.contents.len(),
                "bundle written"
            );

            Ok(TaskReport {
                written: vec![out_path],
                removed: Vec::new(),
            })
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::actions::BuildEnv;
    use crate::config::ProjectPaths;
    use crate::fs::RealFileSystem;
    use crate::mode::BuildMode;
    use crate::transform::builtin::{MinifyJs, SOURCEMAP_MARKER, Sourcemap};
    use crate::types::When;

    fn action() -> BundleAction {
        BundleAction::new("app/scripts/main.js", "scripts/main.js", "cat {entry}").with_steps(vec![
            ChainStep::when(When::Release, Arc::new(MinifyJs { preserve_comments: true })),
            ChainStep::when(When::Debug, Arc::new(Sourcemap)),
        ])
    }

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let scripts = dir.path().join("app/scripts");
        std::fs::create_dir_all(&scripts).unwrap();
        std::fs::write(scripts.join("main.js"), "// entry\nvar a = 1;\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn debug_bundle_gets_a_sourcemap_under_staging() {
        let dir = project();
        let env = BuildEnv::new(
            BuildMode::debug(),
            ProjectPaths::conventional(dir.path()),
            Arc::new(RealFileSystem),
        );
        let report = action().run(&env.context("scripts", 1)).await.unwrap();

        let out = dir.path().join(".tmp/scripts/main.js");
        assert_eq!(report.written, vec![out.clone()]);
        let text = std::fs::read_to_string(out).unwrap();
        assert!(text.starts_with("// entry\nvar a = 1;"));
        assert!(text.contains(SOURCEMAP_MARKER));
    }

    #[tokio::test]
    async fn release_bundle_is_minified_into_output_root() {
        let dir = project();
        let env = BuildEnv::new(
            BuildMode::release(),
            ProjectPaths::conventional(dir.path()),
            Arc::new(RealFileSystem),
        );
        action().run(&env.context("scripts", 1)).await.unwrap();

        let text = std::fs::read_to_string(dir.path().join("dist/scripts/main.js")).unwrap();
        assert!(!text.contains("// entry"));
        assert!(!text.contains(SOURCEMAP_MARKER));
    }

    #[tokio::test]
    async fn bundler_failure_is_a_bundle_error() {
        let dir = project();
        let env = BuildEnv::new(
            BuildMode::debug(),
            ProjectPaths::conventional(dir.path()),
            Arc::new(RealFileSystem),
        );
        let broken = BundleAction::new("app/scripts/missing.js", "scripts/main.js", "cat {entry}");
        let err = broken.run(&env.context("scripts", 1)).await.unwrap_err();
        assert!(matches!(err, AssetpipeError::Bundle(_)));
        assert!(!dir.path().join(".tmp/scripts/main.js").exists());
    }
}
