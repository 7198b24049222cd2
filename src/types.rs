use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Behaviour when a new trigger arrives while a run is already in progress.
///
/// - `Queue`: remember the trigger and start a new run when the current one
///   finishes (default behaviour).
/// - `Cancel`: drop any previously queued run and only keep the latest
///   trigger. The run in progress is never interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerWhileRunningBehaviour {
    #[default]
    Queue,
    Cancel,
}

impl FromStr for TriggerWhileRunningBehaviour {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queue" => Ok(TriggerWhileRunningBehaviour::Queue),
            "cancel" => Ok(TriggerWhileRunningBehaviour::Cancel),
            other => Err(format!(
                "invalid triggered_while_running_behaviour: {other} (expected \"queue\" or \"cancel\")"
            )),
        }
    }
}

/// Where memoised transform outputs are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStorageMode {
    /// Store entries under `.assetpipe/cache/` so they survive restarts.
    File,
    /// Store entries in memory only (lost on restart).
    #[default]
    Memory,
}

/// What a connected browser should do after a task finished successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadKind {
    /// Full page reload (markup, images, copied files).
    #[default]
    Page,
    /// Swap stylesheets in place, no page reload.
    Styles,
    /// Notify that the script bundle changed.
    Scripts,
    /// Do not notify clients at all.
    None,
}

impl fmt::Display for ReloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReloadKind::Page => "page",
            ReloadKind::Styles => "styles",
            ReloadKind::Scripts => "scripts",
            ReloadKind::None => "none",
        };
        f.write_str(s)
    }
}

/// Mode selector used by transform steps (`when = ...`) and tasks (`only = ...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum When {
    #[default]
    Always,
    Release,
    Debug,
}

impl When {
    pub fn applies(self, release: bool) -> bool {
        match self {
            When::Always => true,
            When::Release => release,
            When::Debug => !release,
        }
    }
}

/// Which output root(s) a pipeline task writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputRoots {
    /// `dist/` in release mode, `.tmp/` otherwise.
    #[default]
    Mode,
    /// Both `.tmp/` and `dist/`, regardless of mode.
    Both,
}
