//! Configuration system for the sigil OAuth client.
//!
//! Provides TOML-based configuration with:
//! - Authorization server and client registration sections
//! - Config file layering (XDG user config + project-local overrides)
//! - Client secret resolution (env var → config file)

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{
    CONFIG_DIR_ENV, ConfigLocator, ConfigSource, InitOutcome, Layer, LoadedConfig,
    user_config_dir,
};
pub use error::{ConfigError, Result};
pub use secrets::{CLIENT_SECRET_ENV, ResolvedSecret, SecretSource, resolve_client_secret};
pub use types::*;
