// src/watch/session.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{RuntimeEvent, TriggerReason};
use crate::errors::Result;
use crate::watch::bindings::WatchBindings;
use crate::watch::debounce::{Change, ChangeKind, Debouncer};
use crate::watch::path_utils::relative_str;

/// A running watch session.
///
/// One recursive `notify` watcher on the project root feeds a Tokio task
/// that maps paths to bindings, debounces them and sends
/// `RuntimeEvent::TasksTriggered` to the engine.
///
/// [`stop`](WatchSession::stop) (or dropping the session) detaches the
/// watcher and drops pending debounced triggers. A run that is already in
/// progress is not affected.
pub struct WatchSession {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
    event_loop: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSession")
            .field("root", &self.root)
            .field("active", &self.is_active())
            .finish()
    }
}

impl WatchSession {
    /// Start watching `root` recursively.
    ///
    /// - `bindings` maps relative paths to tasks.
    /// - `window` is the debounce window.
    /// - `runtime_tx` is the channel into the engine runtime.
    pub fn start(
        root: impl Into<PathBuf>,
        bindings: WatchBindings,
        window: Duration,
        runtime_tx: mpsc::Sender<RuntimeEvent>,
    ) -> Result<Self> {
        let root = root.into();
        // Canonicalize once so we have a stable base path.
        let root = root.canonicalize().unwrap_or(root);

        // Channel from the blocking notify callback into the async world.
        let (event_tx, event_rx) = mpsc::unbounded_channel::<Event>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    // The receiver is gone once the session stopped.
                    let _ = event_tx.send(event);
                }
                Err(err) => warn!("file watch error: {err}"),
            },
            Config::default(),
        )
        .context("creating file watcher")?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("watching {:?}", root))?;

        info!(root = ?root, bindings = bindings.bindings().len(), "file watcher started");

        let event_loop = tokio::spawn(event_loop(
            root.clone(),
            Arc::new(bindings),
            Debouncer::new(window),
            event_rx,
            runtime_tx,
        ));

        Ok(Self {
            root,
            watcher: Some(watcher),
            event_loop: Some(event_loop),
        })
    }

    pub fn is_active(&self) -> bool {
        self.watcher.is_some()
    }

    /// Detach the watcher and drop pending triggers. Idempotent.
    pub fn stop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            drop(watcher);
            debug!(root = ?self.root, "file watcher stopped");
        }
        if let Some(handle) = self.event_loop.take() {
            handle.abort();
        }
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Map a notify event kind to a change kind. Access events do not count.
pub fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        EventKind::Access(_) => None,
    }
}

async fn event_loop(
    root: PathBuf,
    bindings: Arc<WatchBindings>,
    mut debouncer: Debouncer,
    mut event_rx: mpsc::UnboundedReceiver<Event>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    loop {
        let deadline = debouncer.next_deadline();

        tokio::select! {
            maybe_event = event_rx.recv() => {
                let Some(event) = maybe_event else { break };
                record_event(&root, &bindings, &mut debouncer, event);
            }
            _ = sleep_until(deadline), if deadline.is_some() => {
                for trigger in debouncer.due(std::time::Instant::now()) {
                    debug!(
                        task = %trigger.task,
                        changes = trigger.changes.len(),
                        "debounce window settled"
                    );
                    let event = RuntimeEvent::TasksTriggered {
                        tasks: vec![trigger.task],
                        reason: TriggerReason::FileWatch,
                    };
                    if runtime_tx.send(event).await.is_err() {
                        debug!("runtime channel closed; stopping watcher loop");
                        return;
                    }
                }
            }
        }
    }
    debug!("watcher event loop finished");
}

fn record_event(root: &Path, bindings: &WatchBindings, debouncer: &mut Debouncer, event: Event) {
    let Some(kind) = change_kind(&event.kind) else {
        return;
    };
    let now = std::time::Instant::now();

    for path in event.paths {
        let Some(rel) = relative_str(root, &path) else {
            warn!("could not relativize path {:?} against root {:?}", path, root);
            continue;
        };
        for task in bindings.tasks_for(&rel) {
            debug!(task = %task, path = %rel, ?kind, "watch match");
            debouncer.record(&task, Change::new(rel.clone(), kind), now);
        }
    }
}

async fn sleep_until(deadline: Option<std::time::Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind};

    #[test]
    fn access_events_are_ignored() {
        assert_eq!(change_kind(&EventKind::Access(AccessKind::Any)), None);
        assert_eq!(change_kind(&EventKind::Create(CreateKind::File)), Some(ChangeKind::Created));
        assert_eq!(change_kind(&EventKind::Modify(ModifyKind::Any)), Some(ChangeKind::Modified));
        assert_eq!(change_kind(&EventKind::Remove(RemoveKind::File)), Some(ChangeKind::Removed));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::channel(4);
        let mut session =
            WatchSession::start(dir.path(), WatchBindings::new(), Duration::from_millis(50), tx).unwrap();
        assert!(session.is_active());
        session.stop();
        session.stop();
        assert!(!session.is_active());
    }
}
