//! Request / response types, exactly as sent on the wire.
//!
//! All API methods take and return structs (or [`Empty`]) rather than bare
//! primitives or `()`, so fields can be added in a backwards-compatible way.
//!
//! [`Empty`]: crate::types::Empty

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{
    amount::Amount,
    chat::{Message, MessageId, MessageKind, MessageRequest, MessageRequestId},
    exam::{ExamId, LeaderboardEntry, PracticeExam, Question, QuestionId},
    ticket::{Ticket, TicketId, TicketPriority},
    user::{UserId, UserProfile},
    wallet::{KycStatus, Transaction},
};

// --- Auth --- //

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignupRequest {
    pub display_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Returned by both signup and login.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: UserProfile,
    /// The short-lived bearer token attached to authed requests.
    pub access_token: String,
    /// Seconds until `access_token` expires.
    pub expires_in_secs: u32,
    /// The long-lived token used to mint new access tokens.
    pub refresh_token: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenRefreshRequest {
    pub refresh_token: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    pub expires_in_secs: u32,
}

// --- Practice exams --- //

/// An upgradeable version of `Vec<PracticeExam>`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct VecPracticeExam {
    pub exams: Vec<PracticeExam>,
}

/// The question list for one attempt, in display order.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExamQuestions {
    pub exam_id: ExamId,
    pub questions: Vec<Question>,
}

/// The submit payload. `answers` maps question id -> selected option index,
/// and contains *only* answered questions; skipped or merely marked questions
/// contribute nothing.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SubmitExamRequest {
    pub answers: BTreeMap<QuestionId, u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetLeaderboard {
    pub exam_id: ExamId,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct VecLeaderboardEntry {
    pub entries: Vec<LeaderboardEntry>,
}

// --- Chat --- //

/// Cursor request for new messages in one conversation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetNewMessages {
    pub peer: UserId,
    /// Exclusive start cursor: only messages with a strictly greater id are
    /// returned. `None` fetches from the beginning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<MessageId>,
    /// Max number of messages to return. The backend applies its own cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u16>,
}

/// An upgradeable version of `Vec<Message>`. Messages are sorted by id
/// ascending and contain no duplicates.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct VecMessage {
    pub messages: Vec<Message>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub receiver: UserId,
    pub kind: MessageKind,
    pub content: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct VecMessageRequest {
    pub requests: Vec<MessageRequest>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageRequestAction {
    pub request_id: MessageRequestId,
}

// --- Support tickets --- //

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct VecTicket {
    pub tickets: Vec<Ticket>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetTicket {
    pub ticket_id: TicketId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateTicketRequest {
    pub subject: String,
    pub description: String,
    pub priority: TicketPriority,
    /// Ids of files already uploaded via the out-of-band upload endpoint.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachment_ids: Vec<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateReplyRequest {
    pub body: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachment_ids: Vec<i64>,
}

// --- Wallet --- //

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct VecTransaction {
    pub transactions: Vec<Transaction>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TopUpRequest {
    pub amount: Amount,
}

/// The pending ledger entry created for a top-up, plus the checkout URL the
/// UI hands off to the payment provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TopUpResponse {
    pub transaction: Transaction,
    pub checkout_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KycState {
    pub status: KycStatus,
    /// Set when `status` is `Rejected`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_reason: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmitKycRequest {
    /// e.g. "PASSPORT", "NATIONAL_ID".
    pub document_type: String,
    pub document_number: String,
    /// Id of the uploaded document scan.
    pub document_upload_id: i64,
}

#[cfg(test)]
mod test {
    use super::*;

    /// The submit payload must contain only answered questions, keyed by
    /// question id, with integer map keys stringified in JSON.
    #[test]
    fn submit_exam_wire_format() {
        let mut answers = BTreeMap::new();
        answers.insert(QuestionId(11), 2);
        let req = SubmitExamRequest { answers };
        assert_eq!(
            serde_json::to_string(&req).unwrap(),
            r#"{"answers":{"11":2}}"#,
        );
    }

    #[test]
    fn get_new_messages_query_string() {
        let req = GetNewMessages {
            peer: UserId(7),
            after: Some(MessageId(42)),
            limit: Some(50),
        };
        assert_eq!(
            serde_urlencoded::to_string(&req).unwrap(),
            "peer=7&after=42&limit=50",
        );

        let req = GetNewMessages {
            peer: UserId(7),
            after: None,
            limit: None,
        };
        assert_eq!(serde_urlencoded::to_string(&req).unwrap(), "peer=7");
    }
}
