//! Priority-ordered, short-circuiting event dispatch.
//!
//! The [`Dispatcher`] walks a [`RegistrySnapshot`] in order and offers the
//! event to every plugin whose trigger selects it:
//!
//! 1. Lifecycle events go to plugins exposing the lifecycle entry point
//! 2. Message events go to wildcard plugins, to plugins whose trigger equals
//!    the command name, and to plugins whose `prefix + trigger` starts the text
//! 3. Every other event goes to wildcard plugins only
//!
//! The first plugin returning `Ok(true)` stops the walk. Errors and panics
//! are logged against the plugin and the walk continues.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{Instrument, debug, error, info_span, warn};

use lunar_core::{BotApi, DEFAULT_TRIGGER_PREFIX, Event, MessageEvent};

use crate::handler::HandlerContext;
use crate::manifest::Trigger;
use crate::registry::{PluginDescriptor, RegistrySnapshot};

/// Routes events through the loaded plugins.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    prefix: String,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGER_PREFIX)
    }
}

impl Dispatcher {
    /// Creates a dispatcher matching literal triggers behind `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Dispatches `event`. Returns `true` when a plugin handled it.
    pub async fn dispatch(
        &self,
        event: &Arc<Event>,
        snapshot: &RegistrySnapshot,
        bot: &Arc<dyn BotApi>,
    ) -> bool {
        let lifecycle = event.is_lifecycle();

        for plugin in snapshot.plugins() {
            let Some(remainder) = self.select(plugin, event) else {
                continue;
            };

            let span = info_span!("plugin", name = %plugin.name);
            let ctx = HandlerContext::new(
                Arc::clone(event),
                remainder,
                Arc::clone(&plugin.name),
                Arc::clone(&plugin.config),
                Arc::clone(bot),
                span.clone(),
            );
            let handler = Arc::clone(&plugin.handler);
            let call = async {
                if lifecycle {
                    handler.on_lifecycle(&ctx).await
                } else {
                    handler.on_event(&ctx).await
                }
            };

            match AssertUnwindSafe(call.instrument(span)).catch_unwind().await {
                Ok(Ok(true)) => {
                    debug!(plugin = %plugin.name, event = %event, "Event handled");
                    return true;
                }
                Ok(Ok(false)) => {}
                Ok(Err(e)) => {
                    error!(plugin = %plugin.name, error = %e, "Plugin handler failed");
                }
                Err(panic) => {
                    error!(
                        plugin = %plugin.name,
                        panic = panic_message(&*panic),
                        "Plugin handler panicked"
                    );
                }
            }
        }
        false
    }

    /// Decides whether `plugin` sees `event`, and with which remainder.
    fn select(&self, plugin: &PluginDescriptor, event: &Event) -> Option<String> {
        let entry = plugin.handler.entry_points();
        match event {
            Event::Lifecycle(_) => entry.lifecycle.then(String::new),
            Event::Message(msg) if entry.events => self.match_message(&plugin.trigger, msg),
            _ if entry.events && plugin.trigger.is_wildcard() => Some(String::new()),
            _ => None,
        }
    }

    fn match_message(&self, trigger: &Trigger, msg: &MessageEvent) -> Option<String> {
        let word = match trigger {
            Trigger::Wildcard => return Some(msg.remainder.clone()),
            Trigger::Literal(word) => word,
        };
        if let Some(command) = &msg.command
            && &command.name == word
        {
            return Some(command.args.clone());
        }
        let rest = msg.text.strip_prefix(self.prefix.as_str())?;
        rest.strip_prefix(word.as_str())
            .map(|rest| rest.trim().to_string())
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        warn!("Panic with a non-string payload");
        "<non-string panic>"
    }
}
