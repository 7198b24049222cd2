// tests/config_errors.rs

use assetpipe::config::ConfigFile;
use assetpipe::config::loader::{load_and_validate, parse_str};
use assetpipe::errors::{AssetpipeError, Result};
use assetpipe_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};

fn validate(toml: &str) -> Result<ConfigFile> {
    ConfigFile::try_from(parse_str(toml)?)
}

#[test]
fn unknown_dependency_is_rejected() {
    let err = ConfigFileBuilder::new()
        .with_task("scripts", TaskConfigBuilder::command("true").after("lint").build())
        .try_build()
        .unwrap_err();

    match err {
        AssetpipeError::UnknownDependency { task, dependency } => {
            assert_eq!(task, "scripts");
            assert_eq!(dependency, "lint");
        }
        other => panic!("expected UnknownDependency, got {other:?}"),
    }
}

#[test]
fn dependency_cycle_is_rejected() {
    let err = validate(
        r#"
[task.a]
kind = "group"
after = ["b"]

[task.b]
kind = "group"
after = ["a"]
"#,
    )
    .unwrap_err();
    assert!(matches!(err, AssetpipeError::DagCycle(_)), "got {err:?}");
}

#[test]
fn self_dependency_is_a_cycle() {
    let err = ConfigFileBuilder::new()
        .with_task("a", TaskConfigBuilder::group().after("a").build())
        .try_build()
        .unwrap_err();
    assert!(matches!(err, AssetpipeError::DagCycle(_)));
}

#[test]
fn pipeline_without_sources_is_rejected() {
    let err = validate(
        r#"
[task.styles]
kind = "pipeline"
dest = "styles"
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("requires `src`"), "got {err}");
}

#[test]
fn unknown_trigger_behaviour_is_rejected() {
    let err = ConfigFileBuilder::new()
        .behaviour("sometimes")
        .with_task("a", TaskConfigBuilder::group().build())
        .try_build()
        .unwrap_err();
    assert!(matches!(err, AssetpipeError::ConfigError(_)), "got {err:?}");
}

#[test]
fn build_list_must_name_existing_tasks() {
    let err = ConfigFileBuilder::new()
        .build_tasks(&["default"])
        .with_task("a", TaskConfigBuilder::group().build())
        .try_build()
        .unwrap_err();
    assert!(err.to_string().contains("[build].tasks references unknown task 'default'"));
}

#[test]
fn invalid_glob_is_rejected() {
    let err = ConfigFileBuilder::new()
        .with_task("copy", TaskConfigBuilder::pipeline("app/[*.txt").build())
        .try_build()
        .unwrap_err();
    assert!(err.to_string().contains("invalid glob pattern"), "got {err}");
}

#[test]
fn transform_steps_need_their_fields() {
    let err = validate(
        r#"
[task.styles]
kind = "pipeline"
src = ["app/*.scss"]

[[task.styles.transform]]
use = "rename"
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("`rename` step requires `ext`"), "got {err}");
}

#[test]
fn missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_and_validate(dir.path().join("Assetpipe.toml")).is_err());
}

#[test]
fn valid_file_round_trips_through_the_loader() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Assetpipe.toml");
    std::fs::write(
        &path,
        r#"
[config]
triggered_while_running_behaviour = "cancel"
keep_going = true

[task.lint]
kind = "lint"
src = ["app/scripts/**/*.js"]

[task.scripts]
kind = "bundle"
entry = "app/scripts/main.js"
output = "scripts/main.js"
after = ["lint"]
"#,
    )
    .unwrap();

    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.tasks().len(), 2);
    assert!(cfg.config_section().keep_going);
    assert_eq!(cfg.tasks()["scripts"].after, vec!["lint"]);
}
