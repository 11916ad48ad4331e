//! # Lunar Framework
//!
//! Plugin machinery for the Lunar bot runtime:
//!
//! - [`Handler`]: the contract a plugin implements, invoked with a
//!   per-call [`HandlerContext`]
//! - [`HandlerCatalog`]: explicit registration of handler implementations
//! - [`PluginRegistry`]: discovery from manifests on disk, enable/disable,
//!   hot reload through a polling watcher
//! - [`Dispatcher`]: priority-ordered, short-circuiting routing of events
//!   through the current [`RegistrySnapshot`]

pub mod catalog;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod manifest;
pub mod registry;
mod watcher;

pub use catalog::{HandlerCatalog, PluginLoadContext};
pub use dispatcher::Dispatcher;
pub use error::{BoxError, HandlerResult, RegistryError, RegistryResult};
pub use handler::{BoxedHandler, EntryPoints, Handler, HandlerContext};
pub use manifest::{DEFAULT_PRIORITY, Manifest, Trigger, UnitKind};
pub use registry::{
    DEFAULT_WATCH_INTERVAL, LoadFailure, PluginDescriptor, PluginRegistry, PluginReport,
    PluginSummary, RegistrySnapshot,
};
pub use watcher::RegistryCommand;
