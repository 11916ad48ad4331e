//! Request events (`post_type = "request"`).

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct FriendRequest {
    pub user_id: i64,
}

/// Join request (`add`) or invitation of the bot (`invite`).
#[derive(Debug, Clone, Deserialize)]
pub struct GroupRequest {
    pub group_id: i64,
    pub user_id: i64,
}

/// Subtype of a request event.
#[derive(Debug, Clone)]
pub enum RequestKind {
    Friend(FriendRequest),
    GroupAdd(GroupRequest),
    GroupInvite(GroupRequest),
    Other,
}

/// A classified request event.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub time: i64,
    pub self_id: i64,
    pub kind: RequestKind,
    /// Verification message supplied by the requester.
    pub comment: String,
    /// Opaque token needed to approve or reject the request.
    pub flag: String,
    pub(crate) request_type: String,
    pub(crate) raw: Arc<Value>,
}

impl RequestEvent {
    pub fn user_id(&self) -> Option<i64> {
        match &self.kind {
            RequestKind::Friend(r) => Some(r.user_id),
            RequestKind::GroupAdd(r) | RequestKind::GroupInvite(r) => Some(r.user_id),
            RequestKind::Other => None,
        }
    }

    pub fn group_id(&self) -> Option<i64> {
        match &self.kind {
            RequestKind::GroupAdd(r) | RequestKind::GroupInvite(r) => Some(r.group_id),
            _ => None,
        }
    }

    pub(crate) fn subtype(&self) -> &str {
        match self.kind {
            RequestKind::Friend(_) => "friend",
            RequestKind::GroupAdd(_) => "group_add",
            RequestKind::GroupInvite(_) => "group_invite",
            RequestKind::Other => &self.request_type,
        }
    }
}
