//! # Kilowatch Config
//!
//! Configuration loading, validation, and inventory import for the kilowatch
//! exporter. Files may be YAML, TOML, or JSON; `${VAR}` and `${VAR:-default}`
//! placeholders are expanded from the environment before parsing, which keeps
//! device passwords out of config files.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod inventory;
pub mod loader;
pub mod types;
pub mod validator;

pub use loader::{load_config, load_from_file, load_from_str, ConfigFormat};
pub use types::{AuthConfig, AuthGroupConfig, CircuitBreakerConfig, Config, TargetConfig};
pub use validator::validate_config;
