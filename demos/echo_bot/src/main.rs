//! Echo Bot Example
//!
//! A small Lunar bot. Handlers are registered in a catalog; the manifests in
//! `plugins/` decide which of them are loaded, their triggers and their
//! order. Edit a manifest while the bot runs and it reloads.
//!
//! ```text
//! plugins/
//! ├── ping.toml          /ping   -> ping
//! ├── echo.toml          /echo   -> echo
//! ├── group.toml         /group  -> group (disabled)
//! ├── logger.toml        Any     -> logger
//! └── info/plugin.toml   /info   -> message-info
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package echo-bot -- --config demos/echo_bot/lunar.toml
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use lunar::core::event::MessageKind;
use lunar::prelude::*;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(version, about = "Lunar echo bot")]
struct Args {
    /// Configuration file (defaults to searching for lunar.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. "development"
    #[arg(short, long)]
    profile: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Default)]
struct Ping;

#[async_trait]
impl Handler for Ping {
    async fn on_event(&self, ctx: &HandlerContext) -> HandlerResult {
        ctx.reply("Pong! 🏓").await?;
        Ok(true)
    }
}

#[derive(Debug, Deserialize)]
struct EchoConfig {
    #[serde(default = "default_max_len")]
    max_len: usize,
}

fn default_max_len() -> usize {
    500
}

/// Repeats the command arguments, truncated to `max_len` characters.
struct Echo {
    max_len: usize,
}

#[async_trait]
impl Handler for Echo {
    async fn on_event(&self, ctx: &HandlerContext) -> HandlerResult {
        let text: String = ctx.remainder().chars().take(self.max_len).collect();
        if text.is_empty() {
            return Ok(false);
        }
        ctx.reply(text).await?;
        Ok(true)
    }
}

#[derive(Default)]
struct Logger;

#[async_trait]
impl Handler for Logger {
    fn entry_points(&self) -> EntryPoints {
        EntryPoints::BOTH
    }

    async fn on_event(&self, ctx: &HandlerContext) -> HandlerResult {
        if let Some(msg) = ctx.message() {
            let name = msg.sender.display_name().unwrap_or("Unknown");
            match &msg.kind {
                MessageKind::Group(g) => {
                    info!("[Group {}] {} ({}): {}", g.group_id, name, msg.user_id, msg.text)
                }
                _ => info!("[Private] {} ({}): {}", name, msg.user_id, msg.text),
            }
        }
        Ok(false)
    }

    async fn on_lifecycle(&self, ctx: &HandlerContext) -> HandlerResult {
        if let Some(stage) = ctx.lifecycle() {
            info!(stage = stage.subtype(), "Lifecycle");
        }
        Ok(false)
    }
}

#[derive(Default)]
struct MessageInfo;

#[async_trait]
impl Handler for MessageInfo {
    async fn on_event(&self, ctx: &HandlerContext) -> HandlerResult {
        let Some(msg) = ctx.message() else {
            return Ok(false);
        };
        let name = msg.sender.display_name().unwrap_or("Unknown");
        let text = match &msg.kind {
            MessageKind::Group(g) => format!(
                "📋 Message Info\n• Type: Group\n• From: {} ({})\n• Group: {}\n• Message ID: {}",
                name, msg.user_id, g.group_id, msg.message_id
            ),
            MessageKind::Private(p) => format!(
                "📋 Message Info\n• Type: Private\n• From: {} ({})\n• Message ID: {}\n• Sub Type: {}",
                name, msg.user_id, msg.message_id, p.sub_type
            ),
            MessageKind::Other => return Ok(false),
        };
        ctx.reply(text).await?;
        Ok(true)
    }
}

#[derive(Default)]
struct GroupOnly;

#[async_trait]
impl Handler for GroupOnly {
    async fn on_event(&self, ctx: &HandlerContext) -> HandlerResult {
        let Some(msg) = ctx.message() else {
            return Ok(false);
        };
        let MessageKind::Group(g) = &msg.kind else {
            ctx.reply("This command only works in groups.").await?;
            return Ok(true);
        };
        ctx.reply(format!("✅ Hello group {}!", g.group_id)).await?;
        Ok(true)
    }
}

fn catalog() -> HandlerCatalog {
    let mut catalog = HandlerCatalog::new();
    catalog
        .register_default::<Ping>("ping")
        .register_default::<Logger>("logger")
        .register_default::<MessageInfo>("message-info")
        .register_default::<GroupOnly>("group")
        .register("echo", |ctx: &PluginLoadContext| {
            let config: EchoConfig = ctx.config_as()?;
            Ok(std::sync::Arc::new(Echo {
                max_len: config.max_len,
            }) as _)
        });
    catalog
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = LunarRuntime::builder().catalog(catalog());
    if let Some(path) = args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = args.profile {
        builder = builder.profile(profile);
    }

    let runtime = builder.build()?;
    runtime.run().await?;
    Ok(())
}
