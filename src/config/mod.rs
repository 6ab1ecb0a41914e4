// src/config/mod.rs

//! Pipeline configuration loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Turn the raw model into typed tasks and reject bad graphs (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{
    default_config_path, load_and_validate, load_and_validate_with_fs, load_from_path,
};
pub use model::{
    ActionConfig, ConfigFile, ConfigSection, CredentialsConfig, DefaultSection, RawConfigFile,
    StorageConfig, TaskConfig, TaskDefinition, WarehouseConfig,
};
pub use validate::validate_config;
