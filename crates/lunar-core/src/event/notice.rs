//! Notice events (`post_type = "notice"`).
//!
//! ```text
//! NoticeKind (notice_type)
//! ├── GroupUpload, GroupAdmin, GroupIncrease, GroupDecrease, GroupBan
//! ├── FriendAdd, GroupRecall, FriendRecall
//! └── notify (sub_type)
//!     ├── Poke
//!     └── Honor
//! ```

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

/// Uploaded file info.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    pub name: String,
    pub size: i64,
    #[serde(default)]
    pub busid: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupUpload {
    pub group_id: i64,
    pub user_id: i64,
    pub file: UploadedFile,
}

/// Admin granted (`set`) or revoked (`unset`).
#[derive(Debug, Clone, Deserialize)]
pub struct GroupAdmin {
    pub group_id: i64,
    pub user_id: i64,
    pub sub_type: String,
}

/// Member joined (`approve`, `invite`) or left (`leave`, `kick`, `kick_me`).
#[derive(Debug, Clone, Deserialize)]
pub struct GroupMembership {
    pub group_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub operator_id: i64,
    #[serde(default)]
    pub sub_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupBan {
    pub group_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub operator_id: i64,
    /// `ban` or `lift_ban`.
    #[serde(default)]
    pub sub_type: String,
    /// Seconds.
    #[serde(default)]
    pub duration: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FriendAdd {
    pub user_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupRecall {
    pub group_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub operator_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FriendRecall {
    pub user_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Poke {
    /// Absent for private pokes.
    #[serde(default)]
    pub group_id: Option<i64>,
    pub user_id: i64,
    pub target_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Honor {
    pub group_id: i64,
    pub user_id: i64,
    /// `talkative`, `performer` or `emotion`.
    pub honor_type: String,
}

/// Subtype of a notice event.
#[derive(Debug, Clone)]
pub enum NoticeKind {
    GroupUpload(GroupUpload),
    GroupAdmin(GroupAdmin),
    GroupIncrease(GroupMembership),
    GroupDecrease(GroupMembership),
    GroupBan(GroupBan),
    FriendAdd(FriendAdd),
    GroupRecall(GroupRecall),
    FriendRecall(FriendRecall),
    Poke(Poke),
    Honor(Honor),
    /// Unrecognized or undecodable notice.
    Other,
}

/// A classified notice event.
#[derive(Debug, Clone)]
pub struct NoticeEvent {
    pub time: i64,
    pub self_id: i64,
    pub kind: NoticeKind,
    pub(crate) notice_type: String,
    pub(crate) sub_type: Option<String>,
    pub(crate) raw: Arc<Value>,
}

impl NoticeEvent {
    /// The raw `notice_type` tag.
    pub fn notice_type(&self) -> &str {
        &self.notice_type
    }

    /// Group id, for notices scoped to a group.
    pub fn group_id(&self) -> Option<i64> {
        match &self.kind {
            NoticeKind::GroupUpload(n) => Some(n.group_id),
            NoticeKind::GroupAdmin(n) => Some(n.group_id),
            NoticeKind::GroupIncrease(n) | NoticeKind::GroupDecrease(n) => Some(n.group_id),
            NoticeKind::GroupBan(n) => Some(n.group_id),
            NoticeKind::GroupRecall(n) => Some(n.group_id),
            NoticeKind::Poke(n) => n.group_id,
            NoticeKind::Honor(n) => Some(n.group_id),
            NoticeKind::FriendAdd(_) | NoticeKind::FriendRecall(_) | NoticeKind::Other => None,
        }
    }

    /// The user the notice is about.
    pub fn user_id(&self) -> Option<i64> {
        match &self.kind {
            NoticeKind::GroupUpload(n) => Some(n.user_id),
            NoticeKind::GroupAdmin(n) => Some(n.user_id),
            NoticeKind::GroupIncrease(n) | NoticeKind::GroupDecrease(n) => Some(n.user_id),
            NoticeKind::GroupBan(n) => Some(n.user_id),
            NoticeKind::FriendAdd(n) => Some(n.user_id),
            NoticeKind::GroupRecall(n) => Some(n.user_id),
            NoticeKind::FriendRecall(n) => Some(n.user_id),
            NoticeKind::Poke(n) => Some(n.user_id),
            NoticeKind::Honor(n) => Some(n.user_id),
            NoticeKind::Other => None,
        }
    }

    pub(crate) fn subtype(&self) -> &str {
        match self.kind {
            NoticeKind::GroupUpload(_) => "group_upload",
            NoticeKind::GroupAdmin(_) => "group_admin",
            NoticeKind::GroupIncrease(_) => "group_increase",
            NoticeKind::GroupDecrease(_) => "group_decrease",
            NoticeKind::GroupBan(_) => "group_ban",
            NoticeKind::FriendAdd(_) => "friend_add",
            NoticeKind::GroupRecall(_) => "group_recall",
            NoticeKind::FriendRecall(_) => "friend_recall",
            NoticeKind::Poke(_) => "poke",
            NoticeKind::Honor(_) => "honor",
            NoticeKind::Other => match self.sub_type.as_deref() {
                Some(sub) if self.notice_type == "notify" => sub,
                _ => &self.notice_type,
            },
        }
    }
}
