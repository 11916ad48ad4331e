//! The bot handle plugins talk back through.
//!
//! [`Bot`] implements [`BotApi`] on top of the session and also exposes
//! the registry, the configuration and the message counters, so built-in
//! commands and plugins see the same runtime state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use lunar_core::{ApiResult, BotApi};
use lunar_framework::PluginRegistry;
use lunar_transport::{ConnectionManager, SessionState};

use crate::config::LunarConfig;

/// Actions counted as sent messages.
const SEND_ACTIONS: &[&str] = &["send_msg", "send_private_msg", "send_group_msg"];

// =============================================================================
// MessageStats
// =============================================================================

/// Received/sent counters and uptime.
#[derive(Debug)]
pub struct MessageStats {
    received: AtomicU64,
    sent: AtomicU64,
    started: Instant,
}

impl Default for MessageStats {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStats {
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received(),
            sent: self.sent(),
            uptime: self.uptime(),
        }
    }
}

/// Point-in-time copy of [`MessageStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub received: u64,
    pub sent: u64,
    pub uptime: Duration,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.uptime.as_secs();
        write!(
            f,
            "sent: {}\nreceived: {}\nuptime: {}h {}m {}s",
            self.sent,
            self.received,
            secs / 3600,
            secs % 3600 / 60,
            secs % 60
        )
    }
}

// =============================================================================
// Bot
// =============================================================================

/// API handle backed by the runtime's session.
pub struct Bot {
    session: Arc<ConnectionManager>,
    registry: Arc<PluginRegistry>,
    config: Arc<LunarConfig>,
    stats: Arc<MessageStats>,
}

impl Bot {
    pub fn new(
        session: Arc<ConnectionManager>,
        registry: Arc<PluginRegistry>,
        config: Arc<LunarConfig>,
    ) -> Self {
        Self {
            session,
            registry,
            config,
            stats: Arc::new(MessageStats::new()),
        }
    }

    pub fn session(&self) -> &Arc<ConnectionManager> {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &LunarConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<MessageStats> {
        &self.stats
    }

    fn count_if_send(&self, action: &str) {
        if SEND_ACTIONS.contains(&action) {
            self.stats.record_sent();
        }
    }
}

#[async_trait]
impl BotApi for Bot {
    async fn call_api(&self, action: &str, params: Value) -> ApiResult<Value> {
        trace!(action, "call_api");
        let data = self.session.call(action, params).await?;
        self.count_if_send(action);
        Ok(data)
    }

    async fn push_api(&self, action: &str, params: Value) -> ApiResult<()> {
        trace!(action, "push_api");
        self.session.push(action, params).await?;
        self.count_if_send(action);
        Ok(())
    }
}

impl fmt::Debug for Bot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bot")
            .field("state", &self.session.state())
            .field("plugin_dir", &self.registry.root())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lunar_core::{ApiError, Message};
    use lunar_framework::HandlerCatalog;
    use lunar_transport::{MemoryConnector, SessionConfig};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn stats_render_uptime() {
        let snapshot = StatsSnapshot {
            received: 12,
            sent: 3,
            uptime: Duration::from_secs(3725),
        };
        assert_eq!(snapshot.to_string(), "sent: 3\nreceived: 12\nuptime: 1h 2m 5s");
    }

    #[tokio::test]
    async fn successful_sends_are_counted() {
        let dir = TempDir::new().unwrap();
        let (connector, mut acceptor) = MemoryConnector::pair();
        let session = Arc::new(ConnectionManager::new(
            Arc::new(connector),
            SessionConfig::default(),
        ));
        session.connect(false).await.unwrap();
        let mut peer = acceptor.accept().await.unwrap();

        let bot = Bot::new(
            Arc::clone(&session),
            Arc::new(PluginRegistry::new(dir.path(), HandlerCatalog::new())),
            Arc::new(LunarConfig::default()),
        );

        let responder = tokio::spawn(async move {
            for retcode in [0, 100] {
                let text = peer.next_text().await.unwrap();
                let request: Value = serde_json::from_str(&text).unwrap();
                let status = if retcode == 0 { "ok" } else { "failed" };
                peer.send_text(
                    json!({
                        "status": status,
                        "retcode": retcode,
                        "data": {"message_id": 9},
                        "echo": request["echo"],
                    })
                    .to_string(),
                );
            }
            peer
        });

        assert_eq!(bot.send_private_msg(42, Message::from("hi")).await.unwrap(), 9);
        let err = bot.send_group_msg(7, Message::from("hi")).await.unwrap_err();
        assert!(matches!(err, ApiError::Server { retcode: 100, .. }));
        assert_eq!(bot.stats().sent(), 1);

        let _peer = responder.await.unwrap();
        session.close().await;
    }
}
