//! Message events (`post_type = "message"`).

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::command::Command;
use crate::segment::Segment;

/// Information about the sender, as reported by the protocol end.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub nickname: Option<String>,
    /// Group card (group messages only).
    #[serde(default)]
    pub card: Option<String>,
    /// `owner`, `admin` or `member` (group messages only).
    #[serde(default)]
    pub role: Option<String>,
}

impl Sender {
    /// Card if set, otherwise nickname.
    pub fn display_name(&self) -> Option<&str> {
        self.card
            .as_deref()
            .filter(|c| !c.is_empty())
            .or(self.nickname.as_deref())
    }
}

/// Fields shared by every message event.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MessageHeader {
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub self_id: i64,
    #[serde(default)]
    pub message_type: String,
    #[serde(default)]
    pub message_id: i64,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub raw_message: String,
    #[serde(default)]
    pub sender: Sender,
}

/// Private (direct) message details.
#[derive(Debug, Clone, Deserialize)]
pub struct PrivateMessage {
    /// `friend`, `group` (temporary session) or `other`.
    #[serde(default = "default_private_sub_type")]
    pub sub_type: String,
}

fn default_private_sub_type() -> String {
    "friend".to_string()
}

/// Group message details.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupMessage {
    pub group_id: i64,
    /// `normal`, `anonymous` or `notice`.
    #[serde(default = "default_group_sub_type")]
    pub sub_type: String,
    #[serde(default)]
    pub anonymous: Option<Value>,
}

fn default_group_sub_type() -> String {
    "normal".to_string()
}

/// Subtype of a message event.
#[derive(Debug, Clone)]
pub enum MessageKind {
    Private(PrivateMessage),
    Group(GroupMessage),
    /// Unrecognized `message_type`.
    Other,
}

/// A classified message event.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub time: i64,
    pub self_id: i64,
    pub message_id: i64,
    pub user_id: i64,
    pub raw_message: String,
    pub sender: Sender,
    pub kind: MessageKind,
    /// Decoded segments.
    pub segments: Vec<Segment>,
    /// Derived plain text.
    pub text: String,
    /// Parsed command, when the text starts with the trigger prefix.
    pub command: Option<Command>,
    /// Command args for commands, the whole text otherwise.
    pub remainder: String,
    pub(crate) message_type: String,
    pub(crate) raw: Arc<Value>,
}

impl MessageEvent {
    /// Group id for group messages.
    pub fn group_id(&self) -> Option<i64> {
        match &self.kind {
            MessageKind::Group(group) => Some(group.group_id),
            _ => None,
        }
    }

    /// Returns true for private messages.
    pub fn is_private(&self) -> bool {
        matches!(self.kind, MessageKind::Private(_))
    }

    /// Returns true when the text started with the trigger prefix.
    pub fn is_command(&self) -> bool {
        self.command.is_some()
    }

    /// Returns true when any segment mentions `user_id`.
    pub fn mentions(&self, user_id: i64) -> bool {
        let id = user_id.to_string();
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::At { qq } if *qq == id))
    }

    pub(crate) fn subtype(&self) -> &str {
        match self.kind {
            MessageKind::Private(_) => "private",
            MessageKind::Group(_) => "group",
            MessageKind::Other => &self.message_type,
        }
    }
}
