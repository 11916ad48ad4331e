//! Mapping from decoded frames to [`Event`]s.
//!
//! Classification is a two-level tag lookup: `post_type` picks the category,
//! then `message_type` / `notice_type` (+ `sub_type` for `notify`) /
//! `request_type` (+ `sub_type` for `group`) / `meta_event_type` picks the
//! leaf. Unknown leaves and leaves whose fields fail to decode degrade to the
//! category's generic variant; an unknown category yields
//! [`Event::Unknown`]. Classification never fails.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::command::extract_command;
use crate::event::*;
use crate::segment::{BoxedDecoder, OneBotDecoder, render_text};

/// Default trigger prefix for commands.
pub const DEFAULT_TRIGGER_PREFIX: &str = "/";

/// Turns raw inbound frames into typed events.
#[derive(Clone)]
pub struct EventClassifier {
    prefix: String,
    decoder: BoxedDecoder,
}

impl Default for EventClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGER_PREFIX)
    }
}

impl std::fmt::Debug for EventClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventClassifier")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl EventClassifier {
    /// Creates a classifier using the OneBot array decoder.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            decoder: Arc::new(OneBotDecoder),
        }
    }

    /// Replaces the segment decoder.
    pub fn with_decoder(mut self, decoder: BoxedDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// The trigger prefix used for command extraction.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Classifies one decoded frame.
    pub fn classify(&self, frame: Value) -> Event {
        let raw = Arc::new(frame);
        let post_type = tag(&raw, "post_type");
        let time = raw.get("time").and_then(Value::as_i64).unwrap_or_default();
        let self_id = raw.get("self_id").and_then(Value::as_i64).unwrap_or_default();

        match post_type.as_str() {
            "message" | "message_sent" => self.message(raw),
            "notice" => Event::Notice(notice(raw, time, self_id)),
            "request" => Event::Request(request(raw, time, self_id)),
            "meta_event" => Event::Meta(meta(raw, time, self_id)),
            _ => Event::Unknown(UnknownEvent {
                post_type,
                time,
                self_id,
                raw,
            }),
        }
    }

    fn message(&self, raw: Arc<Value>) -> Event {
        let header: MessageHeader = leaf(&raw, "message").unwrap_or_else(|| MessageHeader {
            time: 0,
            self_id: 0,
            message_type: tag(&raw, "message_type"),
            message_id: 0,
            user_id: 0,
            raw_message: String::new(),
            sender: Sender::default(),
        });

        let kind = match header.message_type.as_str() {
            "private" => leaf(&raw, "message.private").map_or(MessageKind::Other, MessageKind::Private),
            "group" => leaf(&raw, "message.group").map_or(MessageKind::Other, MessageKind::Group),
            _ => MessageKind::Other,
        };

        let segments = raw
            .get("message")
            .map(|m| self.decoder.decode(m))
            .unwrap_or_default();
        let text = render_text(&segments);
        let (command, remainder) = extract_command(&text, &self.prefix);

        Event::Message(MessageEvent {
            time: header.time,
            self_id: header.self_id,
            message_id: header.message_id,
            user_id: header.user_id,
            raw_message: header.raw_message,
            sender: header.sender,
            kind,
            segments,
            text,
            command,
            remainder,
            message_type: header.message_type,
            raw,
        })
    }
}

/// Builds a synthesized lifecycle event.
pub fn lifecycle(event: LifecycleEvent) -> Event {
    Event::Lifecycle(event)
}

fn notice(raw: Arc<Value>, time: i64, self_id: i64) -> NoticeEvent {
    let notice_type = tag(&raw, "notice_type");
    let sub_type = raw.get("sub_type").and_then(Value::as_str).map(str::to_string);

    let kind = match notice_type.as_str() {
        "group_upload" => leaf(&raw, "notice.group_upload").map(NoticeKind::GroupUpload),
        "group_admin" => leaf(&raw, "notice.group_admin").map(NoticeKind::GroupAdmin),
        "group_increase" => leaf(&raw, "notice.group_increase").map(NoticeKind::GroupIncrease),
        "group_decrease" => leaf(&raw, "notice.group_decrease").map(NoticeKind::GroupDecrease),
        "group_ban" => leaf(&raw, "notice.group_ban").map(NoticeKind::GroupBan),
        "friend_add" => leaf(&raw, "notice.friend_add").map(NoticeKind::FriendAdd),
        "group_recall" => leaf(&raw, "notice.group_recall").map(NoticeKind::GroupRecall),
        "friend_recall" => leaf(&raw, "notice.friend_recall").map(NoticeKind::FriendRecall),
        "notify" => match sub_type.as_deref() {
            Some("poke") => leaf(&raw, "notice.notify.poke").map(NoticeKind::Poke),
            Some("honor") => leaf(&raw, "notice.notify.honor").map(NoticeKind::Honor),
            _ => None,
        },
        _ => None,
    };

    NoticeEvent {
        time,
        self_id,
        kind: kind.unwrap_or(NoticeKind::Other),
        notice_type,
        sub_type,
        raw,
    }
}

fn request(raw: Arc<Value>, time: i64, self_id: i64) -> RequestEvent {
    let request_type = tag(&raw, "request_type");

    let kind = match request_type.as_str() {
        "friend" => leaf(&raw, "request.friend").map(RequestKind::Friend),
        "group" => match raw.get("sub_type").and_then(Value::as_str) {
            Some("add") => leaf(&raw, "request.group.add").map(RequestKind::GroupAdd),
            Some("invite") => leaf(&raw, "request.group.invite").map(RequestKind::GroupInvite),
            _ => None,
        },
        _ => None,
    };

    RequestEvent {
        time,
        self_id,
        kind: kind.unwrap_or(RequestKind::Other),
        comment: raw
            .get("comment")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        flag: raw
            .get("flag")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        request_type,
        raw,
    }
}

fn meta(raw: Arc<Value>, time: i64, self_id: i64) -> MetaEvent {
    let meta_event_type = tag(&raw, "meta_event_type");

    let kind = match meta_event_type.as_str() {
        "heartbeat" => leaf(&raw, "meta_event.heartbeat").map(MetaKind::Heartbeat),
        "lifecycle" => leaf(&raw, "meta_event.lifecycle").map(MetaKind::Lifecycle),
        _ => None,
    };

    MetaEvent {
        time,
        self_id,
        kind: kind.unwrap_or(MetaKind::Other),
        meta_event_type,
        raw,
    }
}

fn tag(raw: &Value, key: &str) -> String {
    raw.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Decodes a leaf, logging and returning `None` when its fields don't fit.
fn leaf<T: DeserializeOwned>(raw: &Value, name: &str) -> Option<T> {
    match T::deserialize(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(event = name, error = %e, "Event fields did not decode, using generic variant");
            None
        }
    }
}
