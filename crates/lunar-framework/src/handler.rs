//! The handler contract and the per-invocation context.
//!
//! A plugin is a [`Handler`] implementation registered in a
//! [`HandlerCatalog`](crate::HandlerCatalog) plus a manifest on disk that
//! supplies its trigger, priority and help text.
//!
//! ```rust,ignore
//! struct Ping;
//!
//! #[async_trait]
//! impl Handler for Ping {
//!     async fn on_event(&self, ctx: &HandlerContext) -> HandlerResult {
//!         ctx.reply("pong").await?;
//!         Ok(true)
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::Span;

use lunar_core::{ApiResult, BotApi, Event, LifecycleEvent, Message, MessageEvent};

use crate::catalog::config_as;
use crate::error::{BoxError, HandlerResult};

/// Which entry points a handler exposes to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoints {
    /// Receives transport events (messages, notices, requests, meta).
    pub events: bool,
    /// Receives the runtime's start/stop lifecycle events.
    pub lifecycle: bool,
}

impl EntryPoints {
    pub const EVENTS: Self = Self {
        events: true,
        lifecycle: false,
    };
    pub const LIFECYCLE: Self = Self {
        events: false,
        lifecycle: true,
    };
    pub const BOTH: Self = Self {
        events: true,
        lifecycle: true,
    };
}

/// A plugin's behavior.
///
/// Both entry points default to "not handled". Returning `Ok(true)` stops
/// the dispatch chain; an `Err` or a panic is logged and the chain goes on.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Entry points this handler wants to be called through.
    fn entry_points(&self) -> EntryPoints {
        EntryPoints::EVENTS
    }

    /// Called for events matching the plugin's trigger.
    async fn on_event(&self, _ctx: &HandlerContext) -> HandlerResult {
        Ok(false)
    }

    /// Called with [`LifecycleEvent::StartListening`] and
    /// [`LifecycleEvent::StopListening`].
    async fn on_lifecycle(&self, _ctx: &HandlerContext) -> HandlerResult {
        Ok(false)
    }
}

/// Shared handler handle.
pub type BoxedHandler = Arc<dyn Handler>;

/// Everything one handler invocation gets to see.
///
/// Built fresh for each invocation. The attached span carries the plugin
/// name, so anything logged while handling is attributed to the plugin.
pub struct HandlerContext {
    event: Arc<Event>,
    remainder: String,
    plugin: Arc<str>,
    config: Arc<Value>,
    bot: Arc<dyn BotApi>,
    span: Span,
}

impl HandlerContext {
    pub fn new(
        event: Arc<Event>,
        remainder: String,
        plugin: Arc<str>,
        config: Arc<Value>,
        bot: Arc<dyn BotApi>,
        span: Span,
    ) -> Self {
        Self {
            event,
            remainder,
            plugin,
            config,
            bot,
            span,
        }
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    /// The message, for message events.
    pub fn message(&self) -> Option<&MessageEvent> {
        self.event.as_message()
    }

    /// The lifecycle event, for lifecycle invocations.
    pub fn lifecycle(&self) -> Option<LifecycleEvent> {
        self.event.as_lifecycle()
    }

    /// Text left after the trigger was consumed.
    ///
    /// For a command match this is the command's arguments; for a prefix
    /// match the text after `prefix + trigger`, trimmed; for wildcard
    /// handlers the processed text of the message.
    pub fn remainder(&self) -> &str {
        &self.remainder
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin
    }

    /// The plugin's manifest `[config]` table (`Null` when absent).
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Deserializes the plugin's config table into `T`.
    pub fn config_as<T: DeserializeOwned>(&self) -> Result<T, BoxError> {
        config_as(&self.config)
    }

    pub fn bot(&self) -> &Arc<dyn BotApi> {
        &self.bot
    }

    /// Span the invocation runs in.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Replies in the conversation the event came from.
    pub async fn reply(&self, message: impl Into<Message>) -> ApiResult<i64> {
        self.bot.reply(&self.event, message.into()).await
    }
}
