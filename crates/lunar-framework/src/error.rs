//! Error types for the Lunar framework.

use std::path::PathBuf;

use thiserror::Error;

/// Error returned by handlers and handler factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What a handler invocation returns: `Ok(true)` stops the dispatch chain.
pub type HandlerResult = Result<bool, BoxError>;

/// Errors raised by [`PluginRegistry`](crate::PluginRegistry) operations.
///
/// Per-unit load problems are not errors; they are recorded as
/// [`LoadFailure`](crate::LoadFailure)s in the snapshot.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The plugin directory could not be read or written.
    #[error("plugin storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No unit with that name exists on disk.
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    /// A manifest could not be read or rewritten.
    #[error("invalid manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    /// Renaming a legacy-disabled unit would overwrite another unit.
    #[error("cannot enable {name}: {target} already exists")]
    Conflict { name: String, target: PathBuf },

    /// The storage watcher could not be started.
    #[error("failed to start plugin watcher: {0}")]
    Watcher(#[source] notify::Error),

    /// A blocking storage task was cancelled or panicked.
    #[error("plugin storage task failed: {0}")]
    Task(String),
}

impl RegistryError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn manifest(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Manifest {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
