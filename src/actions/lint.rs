// src/actions/lint.rs

//! Source linting.
//!
//! Violations are always reported. Whether they fail the task depends on
//! the mode: a watch session only reports them, a one-shot build fails with
//! [`AssetpipeError::Lint`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::actions::command::capture;
use crate::actions::{ActionFuture, BuildEnv, TaskAction, TaskContext, TaskReport};
use crate::config::TaskConfig;
use crate::errors::{AssetpipeError, Result};
use crate::fs::glob::PatternSet;

/// A single rule violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintViolation {
    pub path: PathBuf,
    /// 1-based.
    pub line: usize,
    /// 1-based, in characters.
    pub column: usize,
    pub rule: &'static str,
    pub message: String,
}

/// Built-in rule settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LintRules {
    /// 0 disables the rule.
    pub max_line_length: usize,
}

/// Check `text` against the built-in rules.
pub fn lint_source(path: &Path, text: &str, rules: &LintRules) -> Vec<LintViolation> {
    let mut out = Vec::new();
    let mut push = |line: usize, column: usize, rule: &'static str, message: String| {
        out.push(LintViolation {
            path: path.to_path_buf(),
            line,
            column,
            rule,
            message,
        });
    };

    for (idx, line) in text.lines().enumerate() {
        let n = idx + 1;

        let trimmed = line.trim_end();
        if trimmed.len() != line.len() {
            push(n, trimmed.chars().count() + 1, "no-trailing-spaces", "trailing whitespace".into());
        }

        let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
        if let Some(pos) = indent.find('\t') {
            push(n, pos + 1, "no-tabs", "tab used for indentation".into());
        }

        if let Some(col) = find_debugger(line) {
            push(n, col + 1, "no-debugger", "unexpected `debugger` statement".into());
        }

        let len = line.chars().count();
        if rules.max_line_length > 0 && len > rules.max_line_length {
            push(
                n,
                rules.max_line_length + 1,
                "max-len",
                format!("line is {len} characters long (max {})", rules.max_line_length),
            );
        }
    }

    out
}

/// Column of a `debugger` statement, ignoring `//` comments.
fn find_debugger(line: &str) -> Option<usize> {
    let code = line.split("//").next().unwrap_or(line);
    let mut search = 0;
    while let Some(found) = code[search..].find("debugger") {
        let start = search + found;
        let end = start + "debugger".len();
        let before = code[..start].chars().next_back();
        let after = code[end..].chars().next();
        let is_ident = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$');
        if !is_ident(before) && !is_ident(after) {
            return Some(code[..start].chars().count());
        }
        search = end;
    }
    None
}

/// Lints `src` files with the built-in rules or an external command.
#[derive(Debug)]
pub struct LintAction {
    patterns: Arc<PatternSet>,
    rules: LintRules,
    cmd: Option<String>,
}

impl LintAction {
    pub fn new(src: &[String], exclude: &[String], rules: LintRules) -> Result<Self> {
        Ok(Self {
            patterns: Arc::new(PatternSet::new(src, exclude)?),
            rules,
            cmd: None,
        })
    }

    /// Run `cmd` instead of the built-in rules. A non-zero exit counts as
    /// one error.
    pub fn with_command(mut self, cmd: impl Into<String>) -> Self {
        self.cmd = Some(cmd.into());
        self
    }

    pub fn from_config(task: &TaskConfig) -> Result<Self> {
        let rules = LintRules {
            max_line_length: task.max_line_length.unwrap_or(0),
        };
        let action = Self::new(&task.src, &task.exclude, rules)?;
        Ok(match &task.cmd {
            Some(cmd) => action.with_command(cmd),
            None => action,
        })
    }

    async fn run_external(&self, ctx: &TaskContext, cmd: &str) -> Result<usize> {
        let (status, stdout, stderr) = capture(&ctx.task, cmd, &ctx.paths().root, ctx.mode()).await?;
        for line in String::from_utf8_lossy(&stdout).lines().chain(stderr.lines()) {
            if !line.trim().is_empty() {
                warn!(task = %ctx.task, "{}", line);
            }
        }
        Ok(usize::from(!status.success()))
    }
}

/// Lint every matching file; returns the number of violations.
pub fn lint_files(task: &str, patterns: &PatternSet, rules: &LintRules, env: &BuildEnv) -> Result<usize> {
    let root = &env.paths.root;
    let fs = env.fs.as_ref();
    let files = patterns.collect(fs, root)?;
    debug!(task = %task, files = files.len(), "linting");

    let mut count = 0;
    for rel in &files {
        let text = fs.read_to_string(&root.join(rel))?;
        for v in lint_source(rel, &text, rules) {
            warn!(
                task = %task,
                rule = v.rule,
                "{}:{}:{} {}",
                v.path.display(),
                v.line,
                v.column,
                v.message
            );
            count += 1;
        }
    }
    Ok(count)
}

impl TaskAction for LintAction {
    fn describe(&self) -> String {
        match &self.cmd {
            Some(cmd) => format!("lint {:?} with `{cmd}`", self.patterns.patterns()),
            None => format!("lint {:?}", self.patterns.patterns()),
        }
    }

    fn run<'a>(&'a self, ctx: &'a TaskContext) -> ActionFuture<'a> {
        Box::pin(async move {
            let errors = match &self.cmd {
                Some(cmd) => self.run_external(ctx, cmd).await?,
                None => {
                    let patterns = Arc::clone(&self.patterns);
                    let rules = self.rules.clone();
                    let env = ctx.env.clone();
                    let task = ctx.task.clone();
                    tokio::task::spawn_blocking(move || lint_files(&task, &patterns, &rules, &env))
                        .await
                        .map_err(|e| anyhow!("lint worker for '{}' failed: {e}", ctx.task))??
                }
            };

            if errors == 0 {
                info!(task = %ctx.task, "lint clean");
                return Ok(TaskReport::default());
            }
            if ctx.mode().watch {
                warn!(task = %ctx.task, errors, "lint problems found");
                return Ok(TaskReport::default());
            }
            Err(AssetpipeError::Lint(errors))
        })
    }
}
