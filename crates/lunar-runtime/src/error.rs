//! Runtime error types.

use thiserror::Error;

use lunar_core::TransportError;
use lunar_framework::RegistryError;

use crate::config::ConfigError;

/// Errors that stop the runtime.
///
/// Everything else (bad frames, failing handlers, broken plugins) is logged
/// and isolated to its unit of work.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The initial connection gave up.
    #[error("connection error: {0}")]
    Connection(#[from] TransportError),

    /// The plugin directory is unusable.
    #[error("plugin registry error: {0}")]
    Registry(#[from] RegistryError),

    /// No connector was configured and the WebSocket client is compiled out.
    #[error("no connector available: enable the `ws-client` feature or supply one")]
    NoConnector,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
