// tests/watch_debounce.rs

use std::fs;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use assetpipe::config::{ConfigFile, TransformName, TransformStep};
use assetpipe::engine::{Engine, RuntimeEvent, TriggerReason};
use assetpipe::mode::BuildMode;
use assetpipe::types::{CacheStorageMode, When};
use assetpipe::watch::{WatchBindings, WatchSession};
use assetpipe_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};
use assetpipe_test_utils::{init_tracing, with_timeout};

const WINDOW: Duration = Duration::from_millis(200);

fn bindings() -> WatchBindings {
    let mut bindings = WatchBindings::new();
    bindings.watch(&["src/**/*.txt".to_string()], "copy").unwrap();
    bindings
}

#[tokio::test]
async fn burst_of_writes_triggers_the_task_once() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();

    let (tx, mut rx) = mpsc::channel::<RuntimeEvent>(16);
    let mut session = WatchSession::start(dir.path(), bindings(), WINDOW, tx).unwrap();
    // Give the backend a moment to register its watches.
    sleep(Duration::from_millis(150)).await;

    for i in 0..4 {
        fs::write(dir.path().join("src/a.txt"), format!("edit {i}")).unwrap();
        sleep(Duration::from_millis(20)).await;
    }

    let event = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no trigger within 5 seconds")
        .expect("channel closed");
    match event {
        RuntimeEvent::TasksTriggered { tasks, reason } => {
            assert_eq!(tasks, vec!["copy"]);
            assert_eq!(reason, TriggerReason::FileWatch);
        }
        other => panic!("unexpected event {other:?}"),
    }

    // Nothing else arrives once the window has settled.
    assert!(timeout(WINDOW * 3, rx.recv()).await.is_err());
    session.stop();
}

#[tokio::test]
async fn unbound_paths_do_not_trigger() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();

    let (tx, mut rx) = mpsc::channel::<RuntimeEvent>(16);
    let mut session = WatchSession::start(dir.path(), bindings(), WINDOW, tx).unwrap();
    sleep(Duration::from_millis(150)).await;

    fs::write(dir.path().join("src/notes.md"), "ignored").unwrap();
    fs::write(dir.path().join("README.txt"), "ignored too").unwrap();

    assert!(timeout(WINDOW * 3, rx.recv()).await.is_err());
    session.stop();
}

#[tokio::test]
async fn stopped_session_drops_pending_triggers() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();

    let (tx, mut rx) = mpsc::channel::<RuntimeEvent>(16);
    let mut session =
        WatchSession::start(dir.path(), bindings(), Duration::from_millis(500), tx).unwrap();
    sleep(Duration::from_millis(150)).await;

    fs::write(dir.path().join("src/a.txt"), "pending").unwrap();
    sleep(Duration::from_millis(50)).await;
    session.stop();

    // The event loop owned the only sender, so the channel closes.
    let next = timeout(Duration::from_secs(2), rx.recv()).await.expect("channel should close");
    assert!(next.is_none());
}

#[tokio::test]
async fn deleting_a_watched_source_reruns_its_task_once_and_prunes_the_output() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("app/styles")).unwrap();
    fs::write(dir.path().join("app/styles/keep.css"), "a { }").unwrap();
    fs::write(dir.path().join("app/styles/gone.css"), "b { }").unwrap();

    let mut raw = ConfigFileBuilder::new()
        .with_task(
            "styles",
            TaskConfigBuilder::pipeline("app/styles/*.css")
                .dest("styles")
                .step(TransformStep::new(TransformName::MinifyCss).when(When::Release))
                .build(),
        )
        .raw();
    raw.config.cache_storage = CacheStorageMode::Memory;
    let cfg = ConfigFile::try_from(raw).unwrap();

    let engine = Engine::from_config(&cfg, dir.path(), BuildMode::debug()).unwrap();
    with_timeout(engine.run(&["styles"])).await.unwrap().into_result().unwrap();
    let output = dir.path().join(".tmp/styles/gone.css");
    assert!(output.exists());

    let mut events = engine.subscribe();
    let handle = engine.start();
    let bindings = WatchBindings::from_registry(engine.registry()).unwrap();
    let mut session = WatchSession::start(dir.path(), bindings, WINDOW, handle.sender()).unwrap();
    sleep(Duration::from_millis(150)).await;

    fs::remove_file(dir.path().join("app/styles/gone.css")).unwrap();

    let event = with_timeout(events.recv()).await.unwrap();
    assert_eq!(event.task, "styles");
    assert!(event.error.is_none(), "rebuild failed: {:?}", event.error);
    assert!(timeout(WINDOW * 3, events.recv()).await.is_err(), "task ran more than once");

    session.stop();
    let reports = with_timeout(handle.shutdown()).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].succeeded, vec!["styles"]);
    assert!(!output.exists());
    assert!(dir.path().join(".tmp/styles/keep.css").exists());
}
