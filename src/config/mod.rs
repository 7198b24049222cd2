// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - [`model`] is the TOML-backed data model.
//! - [`loader`] reads a config file from disk (or the built-in default).
//! - [`validate`] checks invariants like DAG correctness and per-kind fields.
//! - [`paths`] resolves the project layout against the project root.

pub mod builtin;
pub mod loader;
pub mod model;
pub mod paths;
pub mod validate;

pub use loader::{builtin_config, load_and_validate, load_from_path, load_or_default};
pub use model::{
    BuildSection, ConfigFile, ConfigSection, PathsSection, RawConfigFile, ServeSection,
    TaskConfig, TaskKind, TransformName, TransformStep,
};
pub use paths::ProjectPaths;
pub use validate::validate_config;
