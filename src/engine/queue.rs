// src/engine/queue.rs

use std::collections::{BTreeSet, VecDeque};

use tracing::debug;

use crate::engine::TaskName;
use crate::types::TriggerWhileRunningBehaviour;

/// Follow-up runs requested while a run was in progress.
///
/// Every entry in `pending` is the root set of one future run, started in
/// order as the engine goes idle. In `Queue` mode a trigger joins the newest
/// entry; a task that entry already holds was changed again after being
/// queued, so it opens a new entry, up to `queue_length` entries. At the
/// limit, triggers fold into the newest entry and nothing is lost.
#[derive(Debug)]
pub struct TriggerQueue {
    behaviour: TriggerWhileRunningBehaviour,
    queue_length: usize,
    pending: VecDeque<BTreeSet<TaskName>>,
}

impl TriggerQueue {
    /// `queue_length` is clamped to at least 1.
    pub fn new(behaviour: TriggerWhileRunningBehaviour, queue_length: usize) -> Self {
        Self {
            behaviour,
            queue_length: queue_length.max(1),
            pending: VecDeque::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn behaviour(&self) -> TriggerWhileRunningBehaviour {
        self.behaviour
    }

    /// Number of queued follow-up runs.
    pub fn batches(&self) -> usize {
        self.pending.len()
    }

    /// Record a trigger that has to wait for the active run to end.
    pub fn record_trigger(&mut self, task: &str) {
        let name = task.to_string();
        if self.behaviour == TriggerWhileRunningBehaviour::Cancel {
            debug!(task = %name, "cancel mode: replacing queued triggers");
            self.pending.clear();
            self.pending.push_back(BTreeSet::from([name]));
            return;
        }

        let opens_batch = match self.pending.back() {
            None => true,
            Some(newest) => newest.contains(&name) && self.pending.len() < self.queue_length,
        };
        if opens_batch {
            self.pending.push_back(BTreeSet::from([name.clone()]));
            debug!(task = %name, batches = self.pending.len(), "queued follow-up run");
        } else if let Some(newest) = self.pending.back_mut() {
            let inserted = newest.insert(name.clone());
            debug!(task = %name, inserted, "coalesced trigger into newest queued run");
        }
    }

    /// Roots of the next follow-up run, oldest first. Empty when nothing is
    /// queued.
    pub fn next_batch(&mut self) -> Vec<TaskName> {
        let batch = self.pending.pop_front().unwrap_or_default();
        if !batch.is_empty() {
            debug!(roots = ?batch, remaining = self.pending.len(), "starting queued run");
        }
        batch.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_triggers_coalesce_into_one_run() {
        let mut q = TriggerQueue::new(TriggerWhileRunningBehaviour::Queue, 3);
        q.record_trigger("styles");
        q.record_trigger("scripts");
        assert_eq!(q.batches(), 1);
        assert_eq!(q.next_batch(), vec!["scripts", "styles"]);
        assert!(q.is_empty());
    }

    #[test]
    fn repeated_trigger_opens_a_new_run_up_to_queue_length() {
        let mut one = TriggerQueue::new(TriggerWhileRunningBehaviour::Queue, 1);
        let mut two = TriggerQueue::new(TriggerWhileRunningBehaviour::Queue, 2);
        for q in [&mut one, &mut two] {
            q.record_trigger("styles");
            q.record_trigger("html");
            q.record_trigger("styles");
            q.record_trigger("scripts");
            q.record_trigger("styles");
        }

        assert_eq!(one.batches(), 1);
        assert_eq!(one.next_batch(), vec!["html", "scripts", "styles"]);

        assert_eq!(two.batches(), 2);
        assert_eq!(two.next_batch(), vec!["html", "styles"]);
        assert_eq!(two.next_batch(), vec!["scripts", "styles"]);
        assert!(two.next_batch().is_empty());
    }

    #[test]
    fn cancel_mode_keeps_only_latest() {
        let mut q = TriggerQueue::new(TriggerWhileRunningBehaviour::Cancel, 3);
        q.record_trigger("styles");
        q.record_trigger("scripts");
        assert_eq!(q.next_batch(), vec!["scripts"]);
    }

    #[test]
    fn zero_queue_length_is_clamped() {
        let mut q = TriggerQueue::new(TriggerWhileRunningBehaviour::Queue, 0);
        q.record_trigger("html");
        q.record_trigger("html");
        assert_eq!(q.batches(), 1);
        assert_eq!(q.next_batch(), vec!["html"]);
    }
}
