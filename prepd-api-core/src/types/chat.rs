use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{time::TimestampMs, user::UserId};

/// A chat message's backend-assigned id. Ids are strictly increasing within
/// a conversation, which is what lets sync code page with an after-id cursor.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message request's backend-assigned id.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct MessageRequestId(pub i64);

impl fmt::Display for MessageRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of chat message this is.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    /// Server-generated notices rendered inline in the conversation.
    System,
}

/// A chat message between two users.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub kind: MessageKind,
    pub content: String,
    pub read: bool,
    pub sender: UserId,
    pub receiver: UserId,
    pub sent_at: TimestampMs,
}

/// A message sent to a non-followed user, pending accept/reject before it
/// becomes a normal conversation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MessageRequest {
    pub id: MessageRequestId,
    pub sender: UserId,
    pub sender_name: String,
    /// The first message's content, shown as a preview.
    pub preview: String,
    pub requested_at: TimestampMs,
}
