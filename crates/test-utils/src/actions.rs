use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assetpipe::actions::{ActionFuture, TaskAction, TaskContext, TaskReport};
use assetpipe::errors::{AssetpipeError, TransformError};
use assetpipe::transform::{Asset, Transform};

/// Shared log of task starts and finishes, e.g. `"start:A"`, `"end:A"`.
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// An action that records when it starts and ends, optionally sleeping in
/// between and optionally failing.
#[derive(Debug, Clone)]
pub struct RecordingAction {
    log: EventLog,
    delay: Duration,
    fail: bool,
}

impl RecordingAction {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: Arc::clone(log),
            delay: Duration::ZERO,
            fail: false,
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn arc(self) -> Arc<dyn TaskAction> {
        Arc::new(self)
    }
}

impl TaskAction for RecordingAction {
    fn describe(&self) -> String {
        "recording".to_string()
    }

    fn run<'a>(&'a self, ctx: &'a TaskContext) -> ActionFuture<'a> {
        Box::pin(async move {
            self.log.lock().unwrap().push(format!("start:{}", ctx.task));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.log.lock().unwrap().push(format!("end:{}", ctx.task));
            if self.fail {
                return Err(AssetpipeError::InvalidState(format!("{} failed on purpose", ctx.task)));
            }
            Ok(TaskReport::default())
        })
    }
}

/// Index of `entry` in the log, panicking if it is missing.
pub fn position(log: &EventLog, entry: &str) -> usize {
    log.lock()
        .unwrap()
        .iter()
        .position(|e| e == entry)
        .unwrap_or_else(|| panic!("{entry} not in log"))
}

/// Uppercases text and counts how often it actually ran.
#[derive(Debug, Default)]
pub struct CountingTransform {
    calls: AtomicUsize,
}

impl CountingTransform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transform for CountingTransform {
    fn id(&self) -> String {
        "counting-upper".to_string()
    }

    fn cacheable(&self) -> bool {
        true
    }

    fn apply(&self, asset: Asset) -> Result<Asset, TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = asset.text("counting-upper")?.to_uppercase();
        Ok(Asset::new(asset.path, text))
    }
}
