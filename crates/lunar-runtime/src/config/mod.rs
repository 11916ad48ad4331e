//! Configuration for the Lunar runtime.
//!
//! Settings are layered with figment. Later layers win:
//!
//! 1. built-in defaults and programmatic overrides
//! 2. `lunar.<profile>.toml`, then `lunar.toml` / `config.toml`
//! 3. `LUNAR_*` environment variables (`__` separates nested keys)

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    ConnectionConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, LunarConfig,
    PermissionsConfig, PluginsConfig, RetryConfig, SpanEventConfig,
};
pub use validation::validate_config;
