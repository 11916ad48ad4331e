//! Operator commands handled by the runtime itself.
//!
//! They run before any plugin and only for command messages. Each command
//! has an English and a Chinese name. Mutating commands and the statistics
//! are limited to the root user, super users and managers; a refused
//! command still counts as handled.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{info, warn};

use lunar_core::{BotApi, Event, Message};
use lunar_framework::{PluginReport, RegistryError, RegistrySnapshot, Trigger, UnitKind};

use crate::bot::Bot;
use crate::config::PermissionsConfig;

/// A built-in command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinCommand {
    Help,
    Plugins,
    Reload,
    Enable,
    Disable,
    Stats,
    Managers,
}

impl BuiltinCommand {
    pub const ALL: [Self; 7] = [
        Self::Help,
        Self::Plugins,
        Self::Reload,
        Self::Enable,
        Self::Disable,
        Self::Stats,
        Self::Managers,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "help" | "帮助" => Self::Help,
            "plugins" | "查看插件" => Self::Plugins,
            "reload" | "重载插件" => Self::Reload,
            "enable" | "启用插件" => Self::Enable,
            "disable" | "禁用插件" => Self::Disable,
            "stats" | "消息统计" => Self::Stats,
            "managers" | "查看管理员" => Self::Managers,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Plugins => "plugins",
            Self::Reload => "reload",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Stats => "stats",
            Self::Managers => "managers",
        }
    }

    fn usage(self) -> &'static str {
        match self {
            Self::Help => "help [plugin] - show this menu or a plugin's details",
            Self::Plugins => "plugins - list plugins",
            Self::Reload => "reload - reload all plugins",
            Self::Enable => "enable <plugin> - enable a plugin",
            Self::Disable => "disable <plugin> - disable a plugin",
            Self::Stats => "stats - message statistics",
            Self::Managers => "managers - list operators",
        }
    }

    pub fn requires_operator(self) -> bool {
        !matches!(self, Self::Help | Self::Plugins)
    }
}

/// Runs built-in commands.
#[derive(Debug, Clone)]
pub struct Builtins {
    prefix: String,
}

impl Builtins {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Handles `event` if it is a built-in command. Returns `true` when it was.
    pub async fn handle(&self, event: &Arc<Event>, bot: &Bot) -> bool {
        let Some(msg) = event.as_message() else {
            return false;
        };
        let Some(command) = &msg.command else {
            return false;
        };
        let Some(builtin) = BuiltinCommand::parse(&command.name) else {
            return false;
        };

        info!(command = builtin.name(), user = msg.user_id, "Built-in command");
        let response = self.run(builtin, &command.args, msg.user_id, bot).await;
        if let Err(e) = bot.reply(event, Message::from(response)).await {
            warn!(command = builtin.name(), error = %e, "Failed to answer built-in command");
        }
        true
    }

    /// Executes `builtin` for `user_id` and returns the response text.
    pub async fn run(&self, builtin: BuiltinCommand, args: &str, user_id: i64, bot: &Bot) -> String {
        let permissions = &bot.config().permissions;
        if builtin.requires_operator() && !permissions.is_operator(user_id) {
            warn!(command = builtin.name(), user = user_id, "Permission denied");
            return format!(
                "Permission denied: only operators can use {}{}",
                self.prefix,
                builtin.name()
            );
        }

        let registry = bot.registry();
        let args = args.trim();
        match builtin {
            BuiltinCommand::Help if args.is_empty() => self.help(&registry.report()),
            BuiltinCommand::Help => self.plugin_detail(args, &registry.snapshot()),
            BuiltinCommand::Plugins => plugin_list(&registry.report()),
            BuiltinCommand::Reload => match registry.reload().await {
                Ok(snapshot) => format!(
                    "Plugins reloaded: {} loaded, {} failed, {} disabled.\nSend {}help for more.",
                    snapshot.len(),
                    snapshot.failures().len(),
                    snapshot.disabled().len(),
                    self.prefix
                ),
                Err(e) => format!("Reload failed: {e}"),
            },
            BuiltinCommand::Enable | BuiltinCommand::Disable if args.is_empty() => {
                format!("Usage: {}{}", self.prefix, builtin.usage())
            }
            BuiltinCommand::Enable => toggle_response("enable", args, registry.enable(args).await),
            BuiltinCommand::Disable => {
                toggle_response("disable", args, registry.disable(args).await)
            }
            BuiltinCommand::Stats => format!("Message statistics\n{}", bot.stats().snapshot()),
            BuiltinCommand::Managers => managers(permissions),
        }
    }

    fn help(&self, report: &PluginReport) -> String {
        let prefix = &self.prefix;
        let mut out = String::from("Lunar help\n\nBuilt-in commands:\n");
        for builtin in BuiltinCommand::ALL {
            let _ = writeln!(out, "{prefix}{}", builtin.usage());
        }

        out.push_str("\nPlugins:\n");
        let (always_on, commands): (Vec<_>, Vec<_>) = report
            .loaded
            .iter()
            .partition(|p| p.trigger.is_wildcard());
        if commands.is_empty() {
            out.push_str("(none)\n");
        }
        for plugin in &commands {
            let _ = writeln!(out, "• {prefix}{} - {}", plugin.trigger, plugin.help);
        }

        if !always_on.is_empty() {
            let _ = writeln!(
                out,
                "\nAlways-on plugins ({}), answering every message:",
                always_on.len()
            );
            for plugin in &always_on {
                let _ = writeln!(out, "• {} - {}", plugin.name, plugin.help);
            }
        }
        out.trim_end().to_string()
    }

    fn plugin_detail(&self, query: &str, snapshot: &RegistrySnapshot) -> String {
        let found = snapshot.plugins().iter().find(|p| {
            p.name.eq_ignore_ascii_case(query)
                || p.trigger
                    .as_literal()
                    .is_some_and(|word| word.eq_ignore_ascii_case(query))
        });

        if let Some(plugin) = found {
            let mut out = format!("Plugin: {}\n", plugin.name);
            match &plugin.trigger {
                Trigger::Wildcard => out.push_str("Trigger: every message\n"),
                Trigger::Literal(word) => {
                    let _ = writeln!(out, "Trigger: {}{word}", self.prefix);
                }
            }
            let _ = writeln!(out, "Help: {}", plugin.help);
            if let Some(word) = plugin.trigger.as_literal() {
                let _ = writeln!(out, "Usage: {}{word} [args]", self.prefix);
            }
            let _ = writeln!(out, "Priority: {}", plugin.priority);
            let kind = match plugin.kind {
                UnitKind::File => "file",
                UnitKind::Directory => "directory",
            };
            let _ = write!(out, "Status: loaded\nType: {kind}");
            return out;
        }

        if let Some(name) = snapshot
            .disabled()
            .iter()
            .find(|name| name.eq_ignore_ascii_case(query))
        {
            return format!("Plugin {name} is disabled and not loaded.");
        }
        if let Some((name, failure)) = snapshot
            .failures()
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(query))
        {
            return format!("Plugin {name} is enabled but failed to load: {failure}");
        }
        format!("No plugin named {query}.")
    }
}

fn plugin_list(report: &PluginReport) -> String {
    let mut out = String::from("Plugins\n\nLoaded:\n");
    if report.loaded.is_empty() {
        out.push_str("(none)\n");
    }
    for plugin in &report.loaded {
        let _ = writeln!(
            out,
            "• {} (trigger: {}, priority: {})",
            plugin.name, plugin.trigger, plugin.priority
        );
        if !plugin.help.is_empty() {
            let _ = writeln!(out, "  help: {}", plugin.help);
        }
    }

    if !report.failed.is_empty() {
        out.push_str("\nFailed:\n");
        for (name, reason) in &report.failed {
            let _ = writeln!(out, "• {name}: {reason}");
        }
    }

    if !report.disabled.is_empty() {
        out.push_str("\nDisabled:\n");
        for name in &report.disabled {
            let _ = writeln!(out, "• {name}");
        }
    }
    out.trim_end().to_string()
}

fn toggle_response(
    verb: &str,
    name: &str,
    result: Result<Arc<RegistrySnapshot>, RegistryError>,
) -> String {
    match result {
        Ok(snapshot) => {
            let state = if snapshot.find(name).is_some() {
                "loaded"
            } else if snapshot.disabled().contains(name) {
                "disabled"
            } else {
                "not loaded"
            };
            format!("Plugin {name}: {verb}d, now {state}.")
        }
        Err(RegistryError::PluginNotFound(_)) => format!("No plugin named {name}."),
        Err(e) => format!("Failed to {verb} {name}: {e}"),
    }
}

fn managers(permissions: &PermissionsConfig) -> String {
    let join = |ids: &[i64]| {
        if ids.is_empty() {
            "(none)".to_string()
        } else {
            ids.iter().map(i64::to_string).collect::<Vec<_>>().join("\n")
        }
    };
    format!(
        "Super users:\n{}\n\nManagers:\n{}",
        join(&permissions.super_users),
        join(&permissions.manager_users)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LunarConfig;
    use lunar_framework::{Handler, HandlerCatalog, PluginRegistry};
    use lunar_transport::{ConnectionManager, MemoryConnector, SessionConfig};
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Noop;
    impl Handler for Noop {}

    const ROOT: i64 = 1;
    const STRANGER: i64 = 99;

    async fn bot(dir: &TempDir) -> Bot {
        let root = dir.path();
        fs::write(root.join("ping.toml"), "trigger = \"ping\"\nhelp = \"replies pong\"\npriority = 1").unwrap();
        fs::write(root.join("logger.toml"), "trigger = \"Any\"\nhelp = \"logs everything\"").unwrap();
        fs::write(root.join("echo.toml"), "trigger = \"echo\"\nenabled = false").unwrap();
        fs::write(root.join("broken.toml"), "trigger = \"b\"").unwrap();

        let mut catalog = HandlerCatalog::new();
        catalog
            .register_default::<Noop>("ping")
            .register_default::<Noop>("logger")
            .register_default::<Noop>("echo");
        let registry = Arc::new(PluginRegistry::new(root, catalog));
        registry.discover_and_load().await.unwrap();

        let mut config = LunarConfig::default();
        config.permissions.root_user = Some(ROOT);
        config.permissions.manager_users = vec![5];

        let (connector, _acceptor) = MemoryConnector::pair();
        let session = Arc::new(ConnectionManager::new(
            Arc::new(connector),
            SessionConfig::default(),
        ));
        Bot::new(session, registry, Arc::new(config))
    }

    #[test]
    fn parses_both_languages() {
        assert_eq!(BuiltinCommand::parse("帮助"), Some(BuiltinCommand::Help));
        assert_eq!(BuiltinCommand::parse("reload"), Some(BuiltinCommand::Reload));
        assert_eq!(BuiltinCommand::parse("禁用插件"), Some(BuiltinCommand::Disable));
        assert_eq!(BuiltinCommand::parse("ping"), None);
        assert!(!BuiltinCommand::Plugins.requires_operator());
        assert!(BuiltinCommand::Stats.requires_operator());
    }

    #[tokio::test]
    async fn help_lists_commands_and_always_on_plugins() {
        let dir = TempDir::new().unwrap();
        let bot = bot(&dir).await;
        let help = Builtins::new("/").run(BuiltinCommand::Help, "", STRANGER, &bot).await;

        assert!(help.contains("/reload - reload all plugins"));
        assert!(help.contains("• /ping - replies pong"));
        assert!(help.contains("Always-on plugins (1)"));
        assert!(help.contains("• logger - logs everything"));
    }

    #[tokio::test]
    async fn help_details_by_name_or_trigger() {
        let dir = TempDir::new().unwrap();
        let bot = bot(&dir).await;
        let builtins = Builtins::new("#");

        let detail = builtins.run(BuiltinCommand::Help, "PING", STRANGER, &bot).await;
        assert!(detail.starts_with("Plugin: ping"));
        assert!(detail.contains("Trigger: #ping"));
        assert!(detail.contains("Priority: 1"));

        let disabled = builtins.run(BuiltinCommand::Help, "echo", STRANGER, &bot).await;
        assert!(disabled.contains("disabled"));
        let failed = builtins.run(BuiltinCommand::Help, "broken", STRANGER, &bot).await;
        assert!(failed.contains("failed to load"));
        let missing = builtins.run(BuiltinCommand::Help, "ghost", STRANGER, &bot).await;
        assert_eq!(missing, "No plugin named ghost.");
    }

    #[tokio::test]
    async fn plugin_list_has_three_sections() {
        let dir = TempDir::new().unwrap();
        let bot = bot(&dir).await;
        let list = Builtins::new("/").run(BuiltinCommand::Plugins, "", STRANGER, &bot).await;
        assert!(list.contains("• ping (trigger: ping, priority: 1)"));
        assert!(list.contains("Failed:\n• broken:"));
        assert!(list.contains("Disabled:\n• echo"));
    }

    #[tokio::test]
    async fn mutating_commands_need_an_operator() {
        let dir = TempDir::new().unwrap();
        let bot = bot(&dir).await;
        let builtins = Builtins::new("/");

        let denied = builtins.run(BuiltinCommand::Disable, "ping", STRANGER, &bot).await;
        assert!(denied.starts_with("Permission denied"));
        assert!(bot.registry().snapshot().find("ping").is_some());

        let done = builtins.run(BuiltinCommand::Disable, "ping", 5, &bot).await;
        assert_eq!(done, "Plugin ping: disabled, now disabled.");
        assert!(bot.registry().snapshot().find("ping").is_none());

        let back = builtins.run(BuiltinCommand::Enable, "ping", ROOT, &bot).await;
        assert_eq!(back, "Plugin ping: enabled, now loaded.");

        let usage = builtins.run(BuiltinCommand::Enable, "", ROOT, &bot).await;
        assert!(usage.starts_with("Usage: /enable"));
        let missing = builtins.run(BuiltinCommand::Enable, "ghost", ROOT, &bot).await;
        assert_eq!(missing, "No plugin named ghost.");
    }

    #[tokio::test]
    async fn stats_and_managers() {
        let dir = TempDir::new().unwrap();
        let bot = bot(&dir).await;
        bot.stats().record_received();
        let builtins = Builtins::new("/");

        let stats = builtins.run(BuiltinCommand::Stats, "", ROOT, &bot).await;
        assert!(stats.contains("received: 1"));
        let managers = builtins.run(BuiltinCommand::Managers, "", ROOT, &bot).await;
        assert_eq!(managers, "Super users:\n(none)\n\nManagers:\n5");
    }
}
