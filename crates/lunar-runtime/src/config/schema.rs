//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use lunar_core::DEFAULT_TRIGGER_PREFIX;
use lunar_transport::{RetryPolicy, SessionConfig};
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LunarConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub plugins: PluginsConfig,

    #[serde(default)]
    pub permissions: PermissionsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Connection
// =============================================================================

/// Where and how to reach the OneBot endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    /// WebSocket URL of the OneBot implementation.
    #[serde(default = "default_url")]
    pub url: String,

    /// Sent as the `access_token` query parameter when set.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Deadline for API calls awaiting a response.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            access_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

impl ConnectionConfig {
    /// Session settings derived from this section.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            retry: self.retry.to_policy(),
            ..SessionConfig::default()
        }
    }
}

fn default_url() -> String {
    "ws://127.0.0.1:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Attempts an initial connect makes before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.backoff_multiplier,
        }
    }
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    2000
}

fn default_max_delay_ms() -> u64 {
    60000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// =============================================================================
// Plugins
// =============================================================================

/// Plugin storage and matching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginsConfig {
    /// Directory holding plugin manifests. Created when missing.
    #[serde(default = "default_plugin_dir")]
    pub dir: PathBuf,

    /// Watch the directory and reload on change.
    #[serde(default)]
    pub auto_reload: bool,

    #[serde(default = "default_watch_interval_ms")]
    pub watch_interval_ms: u64,

    /// Prefix that marks a message as a command.
    #[serde(default = "default_trigger_prefix")]
    pub trigger_prefix: String,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            dir: default_plugin_dir(),
            auto_reload: false,
            watch_interval_ms: default_watch_interval_ms(),
            trigger_prefix: default_trigger_prefix(),
        }
    }
}

impl PluginsConfig {
    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }
}

fn default_plugin_dir() -> PathBuf {
    PathBuf::from("plugins")
}

fn default_watch_interval_ms() -> u64 {
    1000
}

fn default_trigger_prefix() -> String {
    DEFAULT_TRIGGER_PREFIX.to_string()
}

// =============================================================================
// Permissions
// =============================================================================

/// Who may run the mutating built-in commands.
///
/// Read-only here; the lists are never written back.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PermissionsConfig {
    #[serde(default)]
    pub root_user: Option<i64>,

    #[serde(default)]
    pub super_users: Vec<i64>,

    #[serde(default)]
    pub manager_users: Vec<i64>,
}

impl PermissionsConfig {
    pub fn is_root(&self, user_id: i64) -> bool {
        self.root_user == Some(user_id)
    }

    /// Root, a super user or a manager.
    pub fn is_operator(&self, user_id: i64) -> bool {
        self.is_root(user_id)
            || self.super_users.contains(&user_id)
            || self.manager_users.contains(&user_id)
    }
}

// =============================================================================
// Logging
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file, required when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Per-module levels, e.g. `lunar_transport = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file_path: None,
            thread_ids: false,
            file_location: false,
            span_events: SpanEventConfig::default(),
            filters: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to compact otherwise.
    Json,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = LunarConfig::default();
        assert_eq!(config.connection.request_timeout_secs, 30);
        assert_eq!(config.connection.retry.max_retries, 5);
        assert_eq!(config.plugins.dir, PathBuf::from("plugins"));
        assert_eq!(config.plugins.trigger_prefix, "/");
        assert!(!config.plugins.auto_reload);

        let session = config.connection.session_config();
        assert_eq!(session.request_timeout, Duration::from_secs(30));
        assert_eq!(session.retry, RetryPolicy::default());
    }

    #[test]
    fn permissions_cover_all_operator_lists() {
        let perms = PermissionsConfig {
            root_user: Some(1),
            super_users: vec![2],
            manager_users: vec![3],
        };
        assert!(perms.is_root(1));
        assert!(!perms.is_root(2));
        assert!((1..=3).all(|id| perms.is_operator(id)));
        assert!(!perms.is_operator(4));
        assert!(!PermissionsConfig::default().is_operator(0));
    }
}
