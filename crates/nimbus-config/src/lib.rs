//! Configuration system for Nimbus.
//!
//! Provides TOML-based configuration with:
//! - Session timeouts and framing (`[session]`)
//! - The weather server to spawn (`[server]`)
//! - Weather provider settings (`[weather]`)
//! - Log level and file output (`[logging]`)
//! - Config file layering (user config dir + project-local overrides)
//!
//! Every key is optional. Anything left out falls back to the defaults the
//! runtime crates define.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    CONFIG_DIR_ENV, ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    save_config, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
