//! Lunar Runtime - orchestration layer for the Lunar bot runtime.
//!
//! This crate provides:
//! - Layered configuration (`LunarConfig`, `ConfigLoader`)
//! - Logging setup (`LoggingBuilder`)
//! - The `Bot` API handle with message statistics
//! - Built-in operator commands
//! - The `LunarRuntime` consumer loop
//!
//! ```ignore
//! use lunar_runtime::LunarRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = LunarRuntime::builder().catalog(catalog).build()?;
//!
//!     // Run until Ctrl+C
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod builtin;
pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use bot::{Bot, MessageStats, StatsSnapshot};
pub use builtin::{BuiltinCommand, Builtins};
pub use config::{ConfigError, ConfigLoader, ConfigResult, LunarConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{LunarRuntime, RuntimeBuilder};

// Re-export tracing for use by plugin crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for plugin code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
