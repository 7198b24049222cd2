// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `assetpipe`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "assetpipe",
    version,
    about = "Build, watch and serve front-end assets from a TOML pipeline.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// If it does not exist, the built-in default pipeline is used.
    #[arg(long, global = true, value_name = "PATH", default_value = "Assetpipe.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ASSETPIPE_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run tasks once (or keep watching with --watch).
    Build(BuildArgs),
    /// Debug build, dev server with live reload, and watching.
    Serve,
    /// Release build, then serve the output root without watching.
    #[command(name = "serve-dist", alias = "serve:dist")]
    ServeDist,
    /// Remove the staging root and the output root's contents.
    Clean,
    /// List tasks, their dependencies and actions.
    Tasks,
    /// Write the default pipeline to the config path.
    Init,
}

#[derive(Debug, Clone, Default, Args)]
pub struct BuildArgs {
    /// Tasks to run. Defaults to `[build] tasks`.
    #[arg(value_name = "TASK")]
    pub tasks: Vec<String>,

    /// Optimise for production and write to the output root.
    #[arg(long)]
    pub release: bool,

    /// Keep running and re-run tasks when watched files change.
    #[arg(long)]
    pub watch: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_flags_and_tasks_parse() {
        let args = CliArgs::try_parse_from(["assetpipe", "build", "styles", "scripts", "--release"]).unwrap();
        match args.command {
            Command::Build(build) => {
                assert_eq!(build.tasks, vec!["styles", "scripts"]);
                assert!(build.release);
                assert!(!build.watch);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(args.config, "Assetpipe.toml");
    }

    #[test]
    fn serve_dist_has_colon_alias() {
        let args = CliArgs::try_parse_from(["assetpipe", "serve:dist", "--config", "x.toml"]).unwrap();
        assert!(matches!(args.command, Command::ServeDist));
        assert_eq!(args.config, "x.toml");
    }
}
