use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use assetpipe::dag::ScheduledTask;
use assetpipe::engine::{RuntimeEvent, TaskCompletion};
use assetpipe::errors::{AssetpipeError, Result};
use assetpipe::exec::ExecutorBackend;

/// A fake executor that:
/// - records which tasks were "run"
/// - immediately reports a completion for each scheduled task, failing the
///   ones listed in `failing`.
pub struct FakeExecutor {
    runtime_tx: tokio::sync::mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    failing: HashSet<String>,
}

impl FakeExecutor {
    pub fn new(
        runtime_tx: tokio::sync::mpsc::Sender<RuntimeEvent>,
        executed: Arc<Mutex<Vec<String>>>,
    ) -> Self {
        Self {
            runtime_tx,
            executed,
            failing: HashSet::new(),
        }
    }

    pub fn failing(mut self, task: &str) -> Self {
        self.failing.insert(task.to_string());
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let failing = self.failing.clone();

        Box::pin(async move {
            for t in tasks {
                executed.lock().unwrap().push(t.name.clone());

                let completion = if failing.contains(&t.name) {
                    TaskCompletion::failed(&t.name, t.run_id, "fake failure")
                } else {
                    TaskCompletion::success(&t.name, t.run_id)
                };
                tx.send(RuntimeEvent::TaskCompleted(completion))
                    .await
                    .map_err(|e| AssetpipeError::Other(anyhow::anyhow!("runtime channel closed: {e}")))?;
            }
            Ok(())
        })
    }
}
