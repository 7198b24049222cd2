// tests/pipeline_build.rs

use std::fs;
use std::path::Path;
use std::sync::Arc;

use assetpipe::actions::{BuildEnv, PipelineAction, PipelineSpec, TaskAction};
use assetpipe::config::{ConfigFile, ProjectPaths, TransformName, TransformStep};
use assetpipe::engine::Engine;
use assetpipe::fs::RealFileSystem;
use assetpipe::mode::BuildMode;
use assetpipe::transform::{ChainStep, MemoryTransformCache};
use assetpipe::types::{CacheStorageMode, When};
use assetpipe_test_utils::actions::CountingTransform;
use assetpipe_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};
use assetpipe_test_utils::{init_tracing, with_timeout};

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap_or_else(|e| panic!("reading {rel}: {e}"))
}

fn styles_config() -> ConfigFile {
    let mut raw = ConfigFileBuilder::new()
        .with_task(
            "styles",
            TaskConfigBuilder::pipeline("app/styles/*.css")
                .dest("styles")
                .step(TransformStep::new(TransformName::MinifyCss).when(When::Release))
                .step(TransformStep::new(TransformName::Sourcemap).when(When::Debug))
                .build(),
        )
        .raw();
    raw.config.cache_storage = CacheStorageMode::Memory;
    ConfigFile::try_from(raw).unwrap()
}

#[tokio::test]
async fn release_build_minifies_into_the_output_root() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "app/styles/main.css", "body {\n  color: red;\n}\n");

    let engine = Engine::from_config(&styles_config(), dir.path(), BuildMode::release()).unwrap();
    let report = with_timeout(engine.run(&["styles"])).await.unwrap();

    assert!(report.is_success());
    assert_eq!(read(dir.path(), "dist/styles/main.css"), "body{color:red}");
    assert!(!dir.path().join(".tmp/styles/main.css").exists());
}

#[tokio::test]
async fn debug_build_keeps_source_and_adds_a_sourcemap() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "app/styles/main.css", "body {\n  color: red;\n}\n");

    let engine = Engine::from_config(&styles_config(), dir.path(), BuildMode::debug()).unwrap();
    with_timeout(engine.run(&["styles"])).await.unwrap().into_result().unwrap();

    let out = read(dir.path(), ".tmp/styles/main.css");
    assert!(out.starts_with("body {\n  color: red;\n}"));
    assert!(out.contains("sourceMappingURL="));
    assert!(!dir.path().join("dist").exists());
}

#[tokio::test]
async fn rebuilding_unchanged_sources_is_idempotent() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "app/styles/a.css", "a { color: blue; }");
    write(dir.path(), "app/styles/b.css", "b { margin: 0; }");

    let engine = Engine::from_config(&styles_config(), dir.path(), BuildMode::release()).unwrap();
    with_timeout(engine.run(&["styles"])).await.unwrap();
    let first = (read(dir.path(), "dist/styles/a.css"), read(dir.path(), "dist/styles/b.css"));

    with_timeout(engine.run(&["styles"])).await.unwrap();
    let second = (read(dir.path(), "dist/styles/a.css"), read(dir.path(), "dist/styles/b.css"));

    assert_eq!(first, second);
}

#[tokio::test]
async fn cached_transform_only_reruns_for_changed_content() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "app/a.txt", "alpha");
    write(dir.path(), "app/b.txt", "beta");

    let counting = CountingTransform::new();
    let spec = PipelineSpec::new(["app/*.txt"])
        .step(ChainStep::always(counting.clone()))
        .cache(Arc::new(MemoryTransformCache::new()));
    let action = PipelineAction::new(spec).unwrap();
    let env = BuildEnv::new(
        BuildMode::debug(),
        ProjectPaths::conventional(dir.path()),
        Arc::new(RealFileSystem),
    );

    action.run(&env.context("upper", 1)).await.unwrap();
    assert_eq!(counting.calls(), 2);
    assert_eq!(read(dir.path(), ".tmp/a.txt"), "ALPHA");

    action.run(&env.context("upper", 2)).await.unwrap();
    assert_eq!(counting.calls(), 2, "unchanged inputs must come from the cache");
    assert_eq!(read(dir.path(), ".tmp/b.txt"), "BETA");

    write(dir.path(), "app/b.txt", "gamma");
    action.run(&env.context("upper", 3)).await.unwrap();
    assert_eq!(counting.calls(), 3);
    assert_eq!(read(dir.path(), ".tmp/b.txt"), "GAMMA");
}

#[tokio::test]
async fn deleting_a_source_removes_its_output() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "app/styles/keep.css", "a { }");
    write(dir.path(), "app/styles/gone.css", "b { }");

    let engine = Engine::from_config(&styles_config(), dir.path(), BuildMode::release()).unwrap();
    with_timeout(engine.run(&["styles"])).await.unwrap();
    assert!(dir.path().join("dist/styles/gone.css").exists());

    fs::remove_file(dir.path().join("app/styles/gone.css")).unwrap();
    with_timeout(engine.run(&["styles"])).await.unwrap();

    assert!(!dir.path().join("dist/styles/gone.css").exists());
    assert!(dir.path().join("dist/styles/keep.css").exists());
}
