//! Configuration loading, validation, and env substitution.
//!
//! Config files: `scalarweb.toml`, `scalarweb.yaml`, or `scalarweb.json`
//! Searched in `./` then `~/.config/scalarweb/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, discover_and_load, find_config_file, load_config},
    schema::{
        AccessCode, DeviceConfig, HttpConfig, MetricsConfig, RegistrationConfig, ScalarWebConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
