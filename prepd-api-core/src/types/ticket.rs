use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{time::TimestampMs, user::UserId};

/// A support ticket's backend-assigned id.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct TicketId(pub i64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A ticket reply's backend-assigned id.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ReplyId(pub i64);

/// Where a ticket currently sits in the support workflow.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    /// Whether the student can still add replies.
    pub fn accepts_replies(self) -> bool {
        !matches!(self, Self::Closed)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Urgent,
}

/// A support ticket, including its full reply thread. Purely server-sourced;
/// the app re-fetches on screen focus rather than caching.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub subject: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    #[serde(default)]
    pub replies: Vec<Reply>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub created_at: TimestampMs,
    pub updated_at: TimestampMs,
}

/// One reply in a ticket's thread, from either the student or support staff.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub id: ReplyId,
    pub ticket_id: TicketId,
    pub author: UserId,
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub created_at: TimestampMs,
}

/// A file attached to a ticket or reply. The client only ever holds the
/// download URL; bytes are fetched on demand by the UI layer.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub file_name: String,
    pub mime_type: String,
    pub url: String,
    pub size_bytes: u64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_wire_format() {
        // The backend serializes ticket statuses SCREAMING_SNAKE_CASE.
        assert_eq!(
            serde_json::to_string(&TicketStatus::InProgress).unwrap(),
            r#""IN_PROGRESS""#,
        );
        assert_eq!(
            serde_json::from_str::<TicketStatus>(r#""RESOLVED""#).unwrap(),
            TicketStatus::Resolved,
        );
    }

    #[test]
    fn closed_tickets_reject_replies() {
        assert!(TicketStatus::Open.accepts_replies());
        assert!(TicketStatus::InProgress.accepts_replies());
        assert!(TicketStatus::Resolved.accepts_replies());
        assert!(!TicketStatus::Closed.accepts_replies());
    }
}
