//! Meta events (`post_type = "meta_event"`) and the runtime's own lifecycle
//! events.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct Heartbeat {
    #[serde(default)]
    pub status: Value,
    /// Milliseconds until the next heartbeat.
    #[serde(default)]
    pub interval: i64,
}

/// Protocol-side lifecycle (`enable`, `disable`, `connect`).
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleNotice {
    #[serde(default)]
    pub sub_type: String,
}

#[derive(Debug, Clone)]
pub enum MetaKind {
    Heartbeat(Heartbeat),
    Lifecycle(LifecycleNotice),
    Other,
}

/// A classified meta event.
#[derive(Debug, Clone)]
pub struct MetaEvent {
    pub time: i64,
    pub self_id: i64,
    pub kind: MetaKind,
    pub(crate) meta_event_type: String,
    pub(crate) raw: Arc<Value>,
}

impl MetaEvent {
    pub(crate) fn subtype(&self) -> &str {
        match self.kind {
            MetaKind::Heartbeat(_) => "heartbeat",
            MetaKind::Lifecycle(_) => "lifecycle",
            MetaKind::Other => &self.meta_event_type,
        }
    }
}

/// Events synthesized by the runtime around its consumption loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Emitted once before the first inbound event is consumed.
    StartListening,
    /// Emitted once after the loop exits.
    StopListening,
}

impl LifecycleEvent {
    pub fn subtype(&self) -> &'static str {
        match self {
            LifecycleEvent::StartListening => "start_listening",
            LifecycleEvent::StopListening => "stop_listening",
        }
    }
}
