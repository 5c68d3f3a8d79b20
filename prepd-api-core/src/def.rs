//! # API Definitions
//!
//! This module, as closely as possible, defines the various APIs the Prepd
//! backend exposes to the student app. We don't get compile-time guarantees
//! that the server exactly matches these definitions, but keeping every
//! endpoint declared in one place makes it straightforward to audit the
//! client against the server's routers.
//!
//! ## Guidelines
//!
//! All API requests and responses should be structs for upgradeability, and
//! methods that take or return nothing use [`Empty`], NOT `()` (unit type).
//! Using `()` makes it impossible to add optional fields in a
//! backwards-compatible way.
//!
//! Each endpoint is documented with:
//! - 1) HTTP method e.g. `GET`
//! - 2) Endpoint e.g. `/student/wallet`
//! - 3) Data used to make the request e.g. [`GetNewMessages`]
//! - 4) The return type e.g. [`VecMessage`]
//!
//! The methods below should resemble the data actually sent across the wire.

#![deny(missing_docs)]
// We don't export our traits as part of a public API surface currently, so
// auto trait stability is not relevant.
#![allow(async_fn_in_trait)]

use crate::{
    error::BackendApiError,
    models::{
        AuthResponse, CreateReplyRequest, CreateTicketRequest, ExamQuestions,
        GetLeaderboard, GetNewMessages, GetTicket, KycState, LoginRequest,
        MessageRequestAction, SendMessageRequest, SignupRequest,
        SubmitExamRequest, SubmitKycRequest, TokenRefreshRequest,
        TokenRefreshResponse, TopUpRequest, TopUpResponse,
        VecLeaderboardEntry, VecMessage, VecMessageRequest, VecPracticeExam,
        VecTicket, VecTransaction,
    },
    types::{
        chat::Message,
        exam::{ExamId, ExamResult},
        ticket::{Reply, Ticket, TicketId},
        wallet::WalletData,
        Empty,
    },
};

/// The unauthenticated auth API: account creation and token lifecycle.
pub trait AppAuthApi {
    /// POST /student/signup [`SignupRequest`] -> [`AuthResponse`]
    async fn signup(
        &self,
        req: SignupRequest,
    ) -> Result<AuthResponse, BackendApiError>;

    /// POST /student/login [`LoginRequest`] -> [`AuthResponse`]
    async fn login(
        &self,
        req: LoginRequest,
    ) -> Result<AuthResponse, BackendApiError>;

    /// POST /student/token/refresh [`TokenRefreshRequest`] ->
    /// [`TokenRefreshResponse`]
    async fn refresh_token(
        &self,
        req: TokenRefreshRequest,
    ) -> Result<TokenRefreshResponse, BackendApiError>;
}

/// Practice exams: browsing, attempting, results.
pub trait StudentExamApi {
    /// GET /student/practice-exams [`Empty`] -> [`VecPracticeExam`]
    async fn list_practice_exams(
        &self,
    ) -> Result<VecPracticeExam, BackendApiError>;

    /// GET /student/practice-exams/:id/questions [`Empty`] ->
    /// [`ExamQuestions`]
    async fn get_exam_questions(
        &self,
        exam_id: ExamId,
    ) -> Result<ExamQuestions, BackendApiError>;

    /// POST /student/practice-exams/:id/submit [`SubmitExamRequest`] ->
    /// [`ExamResult`]
    async fn submit_exam(
        &self,
        exam_id: ExamId,
        req: SubmitExamRequest,
    ) -> Result<ExamResult, BackendApiError>;

    /// GET /student/leaderboard [`GetLeaderboard`] -> [`VecLeaderboardEntry`]
    async fn get_leaderboard(
        &self,
        req: GetLeaderboard,
    ) -> Result<VecLeaderboardEntry, BackendApiError>;
}

/// Chat: conversation sync, sending, message requests.
pub trait StudentChatApi {
    /// GET /student/messages [`GetNewMessages`] -> [`VecMessage`]
    ///
    /// Returns messages with id strictly greater than the `after` cursor,
    /// sorted by id ascending, at most `limit` of them.
    async fn get_new_messages(
        &self,
        req: GetNewMessages,
    ) -> Result<VecMessage, BackendApiError>;

    /// POST /student/messages [`SendMessageRequest`] -> [`Message`]
    async fn send_message(
        &self,
        req: SendMessageRequest,
    ) -> Result<Message, BackendApiError>;

    /// GET /student/message-requests [`Empty`] -> [`VecMessageRequest`]
    async fn list_message_requests(
        &self,
    ) -> Result<VecMessageRequest, BackendApiError>;

    /// POST /student/message-requests/:id/accept [`Empty`] -> [`Empty`]
    async fn accept_message_request(
        &self,
        req: MessageRequestAction,
    ) -> Result<Empty, BackendApiError>;

    /// POST /student/message-requests/:id/reject [`Empty`] -> [`Empty`]
    async fn reject_message_request(
        &self,
        req: MessageRequestAction,
    ) -> Result<Empty, BackendApiError>;
}

/// Support tickets.
pub trait StudentSupportApi {
    /// GET /student/support-tickets [`Empty`] -> [`VecTicket`]
    async fn list_tickets(&self) -> Result<VecTicket, BackendApiError>;

    /// GET /student/support-tickets/:id [`Empty`] -> [`Ticket`]
    async fn get_ticket(
        &self,
        req: GetTicket,
    ) -> Result<Ticket, BackendApiError>;

    /// POST /student/support-tickets [`CreateTicketRequest`] -> [`Ticket`]
    async fn create_ticket(
        &self,
        req: CreateTicketRequest,
    ) -> Result<Ticket, BackendApiError>;

    /// POST /student/support-tickets/:id/replies [`CreateReplyRequest`] ->
    /// [`Reply`]
    async fn create_reply(
        &self,
        ticket_id: TicketId,
        req: CreateReplyRequest,
    ) -> Result<Reply, BackendApiError>;
}

/// Wallet: balance, ledger, top-ups, KYC.
pub trait StudentWalletApi {
    /// GET /student/wallet [`Empty`] -> [`WalletData`]
    async fn get_wallet(&self) -> Result<WalletData, BackendApiError>;

    /// GET /student/wallet/transactions [`Empty`] -> [`VecTransaction`]
    async fn list_transactions(
        &self,
    ) -> Result<VecTransaction, BackendApiError>;

    /// POST /student/wallet/topup [`TopUpRequest`] -> [`TopUpResponse`]
    async fn top_up(
        &self,
        req: TopUpRequest,
    ) -> Result<TopUpResponse, BackendApiError>;

    /// GET /student/wallet/kyc [`Empty`] -> [`KycState`]
    async fn get_kyc_state(&self) -> Result<KycState, BackendApiError>;

    /// POST /student/wallet/kyc [`SubmitKycRequest`] -> [`Empty`]
    async fn submit_kyc(
        &self,
        req: SubmitKycRequest,
    ) -> Result<Empty, BackendApiError>;
}
