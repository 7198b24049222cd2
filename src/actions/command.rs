// src/actions/command.rs

//! Shell command execution for `command` tasks, external linters and
//! bundlers.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use anyhow::{Context, anyhow};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::actions::{ActionFuture, TaskAction, TaskContext, TaskReport};
use crate::errors::Result;
use crate::mode::BuildMode;

/// Build a shell command appropriate for the platform.
///
/// The command runs in `cwd` and sees the build mode as `ASSETPIPE_MODE`
/// (`release` or `debug`).
pub fn shell_command(cmd: &str, cwd: &Path, mode: BuildMode) -> Command {
    let mut c = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    };
    c.current_dir(cwd)
        .env("ASSETPIPE_MODE", if mode.release { "release" } else { "debug" })
        .kill_on_drop(true);
    c
}

/// Run `cmd` and return its exit status and captured stdout.
///
/// stderr is forwarded to the log line by line.
pub async fn capture(task: &str, cmd: &str, cwd: &Path, mode: BuildMode) -> anyhow::Result<(ExitStatus, Vec<u8>, String)> {
    let output = shell_command(cmd, cwd, mode)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .with_context(|| format!("spawning `{cmd}` for task '{task}'"))?;

    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    for line in stderr.lines() {
        debug!(task = %task, "stderr: {}", line);
    }
    Ok((output.status, output.stdout, stderr))
}

/// Runs a shell command; a non-zero exit fails the task.
#[derive(Debug, Clone)]
pub struct CommandAction {
    cmd: String,
}

impl CommandAction {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }
}

impl TaskAction for CommandAction {
    fn describe(&self) -> String {
        format!("command `{}`", self.cmd)
    }

    fn run<'a>(&'a self, ctx: &'a TaskContext) -> ActionFuture<'a> {
        Box::pin(async move {
            let status = stream(&ctx.task, &self.cmd, &ctx.paths().root, ctx.mode()).await?;
            if !status.success() {
                return Err(anyhow!(
                    "`{}` exited with code {}",
                    self.cmd,
                    status.code().unwrap_or(-1)
                )
                .into());
            }
            Ok(TaskReport::default())
        })
    }
}

/// Run `cmd`, logging its output as it arrives.
async fn stream(task: &str, cmd: &str, cwd: &Path, mode: BuildMode) -> anyhow::Result<ExitStatus> {
    info!(task = %task, cmd = %cmd, "starting command");

    let mut child = shell_command(cmd, cwd, mode)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawning process for task '{task}'"))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let out_task = task.to_string();
    let out = tokio::spawn(async move {
        if let Some(stdout) = stdout {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(task = %out_task, "{}", line);
            }
        }
    });

    let err_task = task.to_string();
    let err = tokio::spawn(async move {
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(task = %err_task, "{}", line);
            }
        }
    });

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for process of task '{task}'"))?;
    let _ = tokio::join!(out, err);

    debug!(task = %task, exit_code = ?status.code(), "command exited");
    Ok(status)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::actions::BuildEnv;
    use crate::config::ProjectPaths;
    use crate::errors::AssetpipeError;
    use crate::fs::RealFileSystem;

    fn ctx(dir: &Path, mode: BuildMode) -> TaskContext {
        BuildEnv::new(mode, ProjectPaths::conventional(dir), Arc::new(RealFileSystem))
            .context("cmd", 1)
    }

    #[tokio::test]
    async fn exit_status_decides_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let ok = CommandAction::new("echo hello");
        assert!(ok.run(&ctx(dir.path(), BuildMode::debug())).await.is_ok());

        let failing = CommandAction::new("echo nope >&2; exit 2");
        let err = failing.run(&ctx(dir.path(), BuildMode::debug())).await.unwrap_err();
        assert!(matches!(err, AssetpipeError::Other(_)));
        assert!(err.to_string().contains("exited with code 2"));
    }

    #[tokio::test]
    async fn mode_is_exported_and_cwd_is_project_root() {
        let dir = tempfile::tempdir().unwrap();
        let (status, stdout, _) =
            capture("t", "printf \"$ASSETPIPE_MODE\"; ls", dir.path(), BuildMode::release())
                .await
                .unwrap();
        assert!(status.success());
        assert_eq!(String::from_utf8(stdout).unwrap(), "release");
    }
}
