//! # Lunar
//!
//! An event-driven runtime bridging a OneBot endpoint and a directory of
//! hot-reloadable plugins.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  frames  ┌────────────┐  events  ┌────────────┐
//! │   Session    │─────────▶│ Classifier │─────────▶│ Dispatcher │──▶ plugin (priority 1)
//! │ (reconnects) │◀─────────│            │          │            │──▶ plugin (priority 2)
//! └──────────────┘   API    └────────────┘          └────────────┘──▶ ...
//!                                                        ▲
//!                                  plugins/*.toml ──▶ Registry ◀── watcher
//! ```
//!
//! - **Session**: one duplex link with request/response correlation
//! - **Classifier**: raw frames to typed events
//! - **Registry**: manifests on disk, enabled state, hot reload
//! - **Dispatcher**: priority-ordered, first handler to accept wins
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lunar::prelude::*;
//!
//! #[derive(Default)]
//! struct Ping;
//!
//! #[async_trait]
//! impl Handler for Ping {
//!     async fn on_event(&self, ctx: &HandlerContext) -> HandlerResult {
//!         ctx.reply("pong").await?;
//!         Ok(true)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut catalog = HandlerCatalog::new();
//!     catalog.register_default::<Ping>("ping");
//!
//!     // plugins/ping.toml: trigger = "ping"
//!     LunarRuntime::builder().catalog(catalog).build()?.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `ws-client`: WebSocket connector (default)
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use lunar_core as core;
pub use lunar_framework as framework;
pub use lunar_runtime as runtime;
pub use lunar_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use lunar::prelude::*;
/// ```
pub mod prelude {
    pub use async_trait::async_trait;

    // Runtime - main entry point
    pub use lunar_runtime::{Bot, LunarRuntime};

    // Plugin contract
    pub use lunar_framework::{
        BoxError, EntryPoints, Handler, HandlerCatalog, HandlerContext, HandlerResult,
        PluginLoadContext,
    };

    // Events and messages
    pub use lunar_core::{
        ApiError, ApiResult, BotApi, Event, LifecycleEvent, Message, MessageEvent, Segment,
    };

    // Logging macros
    pub use lunar_runtime::prelude::*;
}
