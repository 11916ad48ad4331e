//! The classified event taxonomy.
//!
//! ```text
//! Event
//! ├── Message    { Private, Group, Other }
//! ├── Notice     { GroupUpload, GroupAdmin, GroupIncrease, GroupDecrease, GroupBan,
//! │                FriendAdd, GroupRecall, FriendRecall, Poke, Honor, Other }
//! ├── Request    { Friend, GroupAdd, GroupInvite, Other }
//! ├── Meta       { Heartbeat, Lifecycle, Other }
//! ├── Lifecycle  { StartListening, StopListening }   ← synthesized by the runtime
//! └── Unknown                                       ← unrecognized post_type
//! ```
//!
//! Every event built from a frame keeps the source JSON, reachable through
//! [`Event::raw`]. Fields the typed structs do not model can be read from it.

mod message;
mod meta;
mod notice;
mod request;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

pub use message::*;
pub use meta::*;
pub use notice::*;
pub use request::*;

/// Top-level event category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Message,
    Notice,
    Request,
    Meta,
    Lifecycle,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Message => "message",
            Category::Notice => "notice",
            Category::Request => "request",
            Category::Meta => "meta_event",
            Category::Lifecycle => "lifecycle",
            Category::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event whose `post_type` was not recognized.
#[derive(Debug, Clone)]
pub struct UnknownEvent {
    pub post_type: String,
    pub time: i64,
    pub self_id: i64,
    pub(crate) raw: Arc<Value>,
}

/// A classified event.
#[derive(Debug, Clone)]
pub enum Event {
    Message(MessageEvent),
    Notice(NoticeEvent),
    Request(RequestEvent),
    Meta(MetaEvent),
    Lifecycle(LifecycleEvent),
    Unknown(UnknownEvent),
}

impl Event {
    pub fn category(&self) -> Category {
        match self {
            Event::Message(_) => Category::Message,
            Event::Notice(_) => Category::Notice,
            Event::Request(_) => Category::Request,
            Event::Meta(_) => Category::Meta,
            Event::Lifecycle(_) => Category::Lifecycle,
            Event::Unknown(_) => Category::Unknown,
        }
    }

    /// The subtype tag, e.g. `group`, `poke`, `group_invite`, `heartbeat`.
    ///
    /// For generic variants this is the raw tag that was not recognized.
    pub fn subtype(&self) -> &str {
        match self {
            Event::Message(e) => e.subtype(),
            Event::Notice(e) => e.subtype(),
            Event::Request(e) => e.subtype(),
            Event::Meta(e) => e.subtype(),
            Event::Lifecycle(e) => e.subtype(),
            Event::Unknown(e) => &e.post_type,
        }
    }

    /// The source JSON. `None` for synthesized lifecycle events.
    pub fn raw(&self) -> Option<&Value> {
        match self {
            Event::Message(e) => Some(&*e.raw),
            Event::Notice(e) => Some(&*e.raw),
            Event::Request(e) => Some(&*e.raw),
            Event::Meta(e) => Some(&*e.raw),
            Event::Lifecycle(_) => None,
            Event::Unknown(e) => Some(&*e.raw),
        }
    }

    /// Unix timestamp reported by the protocol end (0 for lifecycle events).
    pub fn time(&self) -> i64 {
        match self {
            Event::Message(e) => e.time,
            Event::Notice(e) => e.time,
            Event::Request(e) => e.time,
            Event::Meta(e) => e.time,
            Event::Lifecycle(_) => 0,
            Event::Unknown(e) => e.time,
        }
    }

    /// The bot account that received the event.
    pub fn self_id(&self) -> Option<i64> {
        match self {
            Event::Message(e) => Some(e.self_id),
            Event::Notice(e) => Some(e.self_id),
            Event::Request(e) => Some(e.self_id),
            Event::Meta(e) => Some(e.self_id),
            Event::Lifecycle(_) => None,
            Event::Unknown(e) => Some(e.self_id),
        }
    }

    /// The user the event is about, when there is one.
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Event::Message(e) => Some(e.user_id),
            Event::Notice(e) => e.user_id(),
            Event::Request(e) => e.user_id(),
            _ => None,
        }
    }

    /// The group the event happened in, when there is one.
    pub fn group_id(&self) -> Option<i64> {
        match self {
            Event::Message(e) => e.group_id(),
            Event::Notice(e) => e.group_id(),
            Event::Request(e) => e.group_id(),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&MessageEvent> {
        match self {
            Event::Message(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_lifecycle(&self) -> Option<LifecycleEvent> {
        match self {
            Event::Lifecycle(e) => Some(*e),
            _ => None,
        }
    }

    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Event::Lifecycle(_))
    }
}

/// One-line summary for logs.
impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Message(m) => {
                let who = m.sender.display_name().unwrap_or("?");
                match m.group_id() {
                    Some(group) => write!(f, "[group {group}] {who}({}): {}", m.user_id, m.text),
                    None => write!(f, "[private] {who}({}): {}", m.user_id, m.text),
                }
            }
            Event::Lifecycle(e) => write!(f, "[lifecycle] {}", e.subtype()),
            other => {
                write!(f, "[{}.{}]", other.category(), other.subtype())?;
                if let Some(group) = other.group_id() {
                    write!(f, " group={group}")?;
                }
                if let Some(user) = other.user_id() {
                    write!(f, " user={user}")?;
                }
                Ok(())
            }
        }
    }
}
