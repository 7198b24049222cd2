// src/watch/debounce.rs

//! Trailing-edge debouncing of filesystem changes per task.
//!
//! The debouncer is a plain data structure driven by explicit `Instant`s, so
//! it can be tested without timers. The watch session owns one and sleeps
//! until [`Debouncer::next_deadline`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::engine::TaskName;

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

/// A single observed change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl Change {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// One settled window: run `task` because of `changes` (arrival order).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebouncedTrigger {
    pub task: TaskName,
    pub changes: Vec<Change>,
}

#[derive(Debug)]
struct Pending {
    deadline: Instant,
    changes: Vec<Change>,
}

/// Collects changes per task until no new change arrived for `window`.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: BTreeMap<TaskName, Pending>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: BTreeMap::new(),
        }
    }

    /// Record a change for `task`, restarting its window.
    pub fn record(&mut self, task: &str, change: Change, now: Instant) {
        let deadline = now + self.window;
        match self.pending.get_mut(task) {
            Some(pending) => {
                pending.deadline = deadline;
                pending.changes.push(change);
            }
            None => {
                self.pending.insert(
                    task.to_string(),
                    Pending {
                        deadline,
                        changes: vec![change],
                    },
                );
            }
        }
    }

    /// Earliest deadline among pending tasks.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Remove and return every task whose window has settled at `now`,
    /// ordered by task name.
    pub fn due(&mut self, now: Instant) -> Vec<DebouncedTrigger> {
        let ready: Vec<TaskName> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(task, _)| task.clone())
            .collect();

        ready
            .into_iter()
            .filter_map(|task| {
                self.pending
                    .remove(&task)
                    .map(|p| DebouncedTrigger { task, changes: p.changes })
            })
            .collect()
    }

    /// Drop everything pending.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(100);

    fn modified(path: &str) -> Change {
        Change::new(path, ChangeKind::Modified)
    }

    #[test]
    fn burst_in_window_yields_one_trigger() {
        let start = Instant::now();
        let mut d = Debouncer::new(WINDOW);
        for i in 0..5 {
            d.record("styles", modified("app/styles/main.scss"), start + Duration::from_millis(i * 30));
        }

        // Last event at +120ms, so the window settles at +220ms.
        assert!(d.due(start + Duration::from_millis(200)).is_empty());
        assert_eq!(d.next_deadline(), Some(start + Duration::from_millis(220)));

        let fired = d.due(start + Duration::from_millis(220));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].task, "styles");
        assert_eq!(fired[0].changes.len(), 5);
        assert!(d.is_empty());
    }

    #[test]
    fn same_path_changes_keep_arrival_order() {
        let now = Instant::now();
        let mut d = Debouncer::new(WINDOW);
        d.record("markup", Change::new("app/a.html", ChangeKind::Created), now);
        d.record("markup", modified("app/a.html"), now);
        d.record("markup", Change::new("app/a.html", ChangeKind::Removed), now);

        let fired = d.due(now + WINDOW);
        let kinds: Vec<ChangeKind> = fired[0].changes.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::Created, ChangeKind::Modified, ChangeKind::Removed]);
    }

    #[test]
    fn tasks_settle_independently() {
        let now = Instant::now();
        let mut d = Debouncer::new(WINDOW);
        d.record("styles", modified("a.scss"), now);
        d.record("scripts", modified("a.js"), now + Duration::from_millis(50));

        let first = d.due(now + WINDOW);
        assert_eq!(first.iter().map(|t| t.task.as_str()).collect::<Vec<_>>(), vec!["styles"]);
        let second = d.due(now + Duration::from_millis(150));
        assert_eq!(second.iter().map(|t| t.task.as_str()).collect::<Vec<_>>(), vec!["scripts"]);
    }

    #[test]
    fn clear_drops_pending_triggers() {
        let now = Instant::now();
        let mut d = Debouncer::new(WINDOW);
        d.record("styles", modified("a.scss"), now);
        d.clear();
        assert!(d.due(now + WINDOW).is_empty());
        assert_eq!(d.next_deadline(), None);
    }
}
