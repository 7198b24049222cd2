// src/lib.rs

pub mod actions;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod mode;
pub mod serve;
pub mod transform;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::actions::clean_outputs;
use crate::cli::{BuildArgs, CliArgs, Command};
use crate::config::builtin::DEFAULT_CONFIG;
use crate::config::{ConfigFile, ProjectPaths, load_or_default};
use crate::engine::{Engine, TriggerReason};
use crate::errors::AssetpipeError;
use crate::fs::RealFileSystem;
use crate::mode::{BuildMode, ModeFlags};
use crate::serve::{DevServer, DevServerConfig};
use crate::watch::{WatchBindings, WatchSession};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - mode selection
/// - the engine (scheduler / queue / runtime / executor)
/// - (optional) file watcher and dev server
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);

    if let Command::Init = args.command {
        return init_config(&config_path);
    }

    let cfg = load_or_default(&config_path)?;
    let root = config_root_dir(&config_path);

    match args.command {
        Command::Build(build) => run_build(&cfg, &root, build).await,
        Command::Serve => run_serve(&cfg, &root).await,
        Command::ServeDist => run_serve_dist(&cfg, &root).await,
        Command::Clean => {
            clean_outputs(&RealFileSystem, &ProjectPaths::from_config(&root, &cfg))?;
            Ok(())
        }
        Command::Tasks => print_tasks(&cfg, &root),
        Command::Init => Ok(()),
    }
}

/// Freeze the mode for one top-level invocation.
pub fn select_mode(release: bool, watch: bool) -> crate::errors::Result<BuildMode> {
    let mut flags = ModeFlags::new();
    flags.set_release(release)?;
    flags.set_watch(watch)?;
    Ok(flags.freeze())
}

async fn run_build(cfg: &ConfigFile, root: &Path, args: BuildArgs) -> Result<()> {
    let mode = select_mode(args.release, args.watch)?;
    if mode.release {
        clean_outputs(&RealFileSystem, &ProjectPaths::from_config(root, cfg))?;
    }

    let engine = Engine::from_config(cfg, root, mode)?;
    let tasks = if !args.tasks.is_empty() {
        args.tasks
    } else if !cfg.build_section().tasks.is_empty() {
        cfg.build_section().tasks.clone()
    } else {
        engine.registry().leaves()
    };

    if !mode.watch {
        let report = engine.run(&tasks).await?;
        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            duration_ms = report.duration.as_millis() as u64,
            "build finished"
        );
        report.into_result()?;
        return Ok(());
    }

    watch_until_interrupted(cfg, root, &engine, tasks).await
}

async fn run_serve(cfg: &ConfigFile, root: &Path) -> Result<()> {
    let mode = select_mode(false, true)?;
    let engine = Engine::from_config(cfg, root, mode)?;

    let initial = &cfg.serve_section().tasks;
    let report = engine.run(initial).await?;
    if !report.failed.is_empty() {
        warn!(failed = ?report.failed, "initial build had failures; serving anyway");
    }

    let serve = cfg.serve_section();
    let roots = ProjectPaths::from_config(root, cfg).serve_roots(serve.roots.as_deref());
    let server = DevServer::bind(DevServerConfig::new(roots, serve.port), engine.events()).await?;
    info!(url = %server.url(), "serving");

    let result = watch_until_interrupted(cfg, root, &engine, Vec::new()).await;
    server.shutdown().await?;
    result
}

async fn run_serve_dist(cfg: &ConfigFile, root: &Path) -> Result<()> {
    let mode = select_mode(true, false)?;
    let paths = ProjectPaths::from_config(root, cfg);
    clean_outputs(&RealFileSystem, &paths)?;

    let engine = Engine::from_config(cfg, root, mode)?;
    let tasks = if cfg.build_section().tasks.is_empty() {
        engine.registry().leaves()
    } else {
        cfg.build_section().tasks.clone()
    };
    engine.run(&tasks).await?.into_result()?;

    let config = DevServerConfig::new(vec![paths.output.clone()], cfg.serve_section().dist_port)
        .live_reload(false);
    let server = DevServer::bind(config, engine.events()).await?;
    info!(url = %server.url(), "serving release output");

    tokio::signal::ctrl_c().await.context("listening for Ctrl-C")?;
    server.shutdown().await?;
    Ok(())
}

/// Start a long-lived engine session, run `initial` once, watch every
/// binding and stop on Ctrl-C.
async fn watch_until_interrupted(
    cfg: &ConfigFile,
    root: &Path,
    engine: &Engine,
    initial: Vec<String>,
) -> Result<()> {
    let handle = engine.start();
    if !initial.is_empty() {
        handle.trigger(initial, TriggerReason::Manual).await?;
    }

    let bindings = WatchBindings::from_registry(engine.registry())?;
    let window = Duration::from_millis(cfg.config_section().debounce_ms);
    let mut session = WatchSession::start(root, bindings, window, handle.sender())?;
    info!("watching for changes (Ctrl-C to stop)");

    tokio::signal::ctrl_c().await.context("listening for Ctrl-C")?;
    info!("shutting down");

    session.stop();
    let reports = handle.shutdown().await?;
    info!(runs = reports.len(), "watch session ended");
    Ok(())
}

/// Write the default pipeline, refusing to overwrite an existing file.
fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(AssetpipeError::ConfigError(format!(
            "{} already exists; refusing to overwrite",
            path.display()
        ))
        .into());
    }
    std::fs::write(path, DEFAULT_CONFIG).with_context(|| format!("writing {:?}", path))?;
    println!("wrote {}", path.display());
    Ok(())
}

/// Figure out the project root.
///
/// - If the config path has a non-empty parent (e.g. "site/Assetpipe.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Assetpipe.toml" (parent = ""),
///   we fall back to the current working directory "."
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Print tasks, dependencies and actions.
fn print_tasks(cfg: &ConfigFile, root: &Path) -> Result<()> {
    let paths = ProjectPaths::from_config(root, cfg);
    let registry = actions::registry_from_config(cfg, Arc::new(transform::MemoryTransformCache::new()))?;

    println!("assetpipe tasks");
    println!(
        "  config.triggered_while_running_behaviour = {:?}",
        cfg.behaviour()
    );
    println!("  config.debounce_ms = {}", cfg.config_section().debounce_ms);
    println!("  paths.staging = {}", paths.staging.display());
    println!("  paths.output = {}", paths.output.display());
    println!();

    println!("tasks ({}):", registry.len());
    for def in registry.definitions() {
        println!("  - {}", def.name);
        println!("      action: {}", def.action.describe());
        if !def.deps.is_empty() {
            println!("      after: {:?}", def.deps);
        }
        if !def.watch.is_empty() {
            println!("      watch: {:?}", def.watch);
        }
        if !def.exclude.is_empty() {
            println!("      exclude: {:?}", def.exclude);
        }
        println!("      reload: {}", def.reload);
    }
    Ok(())
}
