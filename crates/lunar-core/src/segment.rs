//! OneBot v11 message segments.
//!
//! A message is an ordered list of segments (`{"type": ..., "data": {...}}`).
//! Only the segment kinds the runtime inspects are typed; everything else is
//! kept verbatim in [`Segment::Other`] so it can be passed through untouched.
//!
//! # Example
//!
//! ```rust,ignore
//! use lunar_core::{Message, Segment};
//!
//! let msg = Message::new()
//!     .push(Segment::reply(42))
//!     .push(Segment::text("pong"));
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A single message segment.
///
/// Serialized in the OneBot array element form, `{"type": ..., "data": {...}}`.
/// Ids arriving as numbers are read as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Segment {
    /// Plain text.
    Text {
        #[serde(default, deserialize_with = "lenient_string")]
        text: String,
    },
    /// Mention of a user (`qq` is a user id or `"all"`).
    At {
        #[serde(default, deserialize_with = "lenient_string")]
        qq: String,
    },
    /// Image reference.
    Image {
        #[serde(default, deserialize_with = "lenient_string")]
        file: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    /// QQ face/emoji.
    Face {
        #[serde(default, deserialize_with = "lenient_string")]
        id: String,
    },
    /// Reply to an earlier message.
    Reply {
        #[serde(default, deserialize_with = "lenient_string")]
        id: String,
    },
    /// Any other segment kind, kept as received.
    #[serde(untagged)]
    Other {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        data: Value,
    },
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or a number, got {other}"
        ))),
    }
}

impl Segment {
    /// Creates a text segment.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates a mention segment.
    pub fn at(user_id: i64) -> Self {
        Self::At {
            qq: user_id.to_string(),
        }
    }

    /// Creates an image segment.
    pub fn image(file: impl Into<String>) -> Self {
        Self::Image {
            file: file.into(),
            url: None,
        }
    }

    /// Creates a reply segment.
    pub fn reply(message_id: i64) -> Self {
        Self::Reply {
            id: message_id.to_string(),
        }
    }

    /// Returns the wire name of this segment's kind.
    pub fn kind(&self) -> &str {
        match self {
            Segment::Text { .. } => "text",
            Segment::At { .. } => "at",
            Segment::Image { .. } => "image",
            Segment::Face { .. } => "face",
            Segment::Reply { .. } => "reply",
            Segment::Other { kind, .. } => kind,
        }
    }

    /// Returns the text if this is a text segment.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Segment::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Plain-text rendering used for logging and trigger matching.
impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Text { text } => f.write_str(text),
            Segment::At { qq } => write!(f, "@{qq}"),
            Segment::Image { .. } => f.write_str("[图片]"),
            Segment::Reply { .. } => f.write_str("[回复]"),
            other => write!(f, "[{}]", other.kind()),
        }
    }
}

// ============================================================================
// Message
// ============================================================================

/// An outbound message: an ordered list of segments.
///
/// Serializes to the OneBot array form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(Vec<Segment>);

impl Message {
    /// Creates an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a segment.
    pub fn push(mut self, segment: Segment) -> Self {
        self.0.push(segment);
        self
    }

    /// Returns the segments.
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Returns true when the message has no segments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders the message as plain text.
    pub fn plain_text(&self) -> String {
        render_text(&self.0)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self(vec![Segment::text(text)])
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self(vec![Segment::text(text)])
    }
}

impl From<Vec<Segment>> for Message {
    fn from(segments: Vec<Segment>) -> Self {
        Self(segments)
    }
}

impl From<Segment> for Message {
    fn from(segment: Segment) -> Self {
        Self(vec![segment])
    }
}

/// Joins segment renderings with a single space.
pub fn render_text(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Decoding
// ============================================================================

/// Turns the raw `message` field of an event into typed segments.
///
/// The classifier is generic over this so that alternative encodings (for
/// example CQ-code strings) can be plugged in without touching it.
pub trait SegmentDecoder: Send + Sync {
    /// Decodes a raw message value.
    fn decode(&self, raw: &Value) -> Vec<Segment>;
}

/// Shared decoder handle.
pub type BoxedDecoder = Arc<dyn SegmentDecoder>;

/// Decoder for the OneBot array format.
///
/// A plain string message is treated as one text segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct OneBotDecoder;

impl SegmentDecoder for OneBotDecoder {
    fn decode(&self, raw: &Value) -> Vec<Segment> {
        match raw {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| Segment::deserialize(item).ok())
                .collect(),
            Value::String(text) if text.is_empty() => Vec::new(),
            Value::String(text) => vec![Segment::text(text.clone())],
            Value::Object(_) => Segment::deserialize(raw).ok().into_iter().collect(),
            _ => Vec::new(),
        }
    }
}
