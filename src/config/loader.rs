// src/config/loader.rs

use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::info;

use crate::config::builtin::DEFAULT_CONFIG;
use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file and return the raw, unvalidated mapping.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading config file at {:?}", path))?;

    parse_str(&contents)
}

/// Parse TOML text into the raw mapping.
pub fn parse_str(contents: &str) -> Result<RawConfigFile> {
    let config: RawConfigFile = toml::from_str(contents)?;
    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// This is the recommended entry point for the rest of the application.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let config = load_from_path(&path)?;
    ConfigFile::try_from(config)
}

/// Like [`load_and_validate`], but falls back to the built-in pipeline when
/// `path` does not exist.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    if path.exists() {
        return load_and_validate(path);
    }

    info!(
        path = %path.display(),
        "config file not found; using built-in default pipeline"
    );
    builtin_config()
}

/// The built-in default pipeline, validated.
pub fn builtin_config() -> Result<ConfigFile> {
    ConfigFile::try_from(parse_str(DEFAULT_CONFIG)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_is_valid() {
        let cfg = builtin_config().expect("built-in config must validate");
        assert!(cfg.tasks().contains_key("styles"));
        assert!(cfg.tasks().contains_key("scripts"));
        assert_eq!(cfg.serve_section().port, 3000);
        assert_eq!(cfg.serve_section().dist_port, 3001);
    }

    #[test]
    fn missing_file_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_or_default(dir.path().join("Assetpipe.toml")).unwrap();
        assert!(cfg.tasks().contains_key("default"));
    }
}
