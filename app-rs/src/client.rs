//! The REST clients the app uses to talk to the Prepd backend.
//!
//! - [`GatewayClient`] serves the unauthenticated surface: signup, login,
//!   and token refresh.
//! - [`StudentClient`] serves everything behind auth. Before each request it
//!   asks the [`BearerAuthenticator`] for a fresh access token (which may
//!   itself round-trip through the gateway's refresh endpoint) and attaches
//!   it as a bearer header.

use std::{sync::Arc, time::SystemTime};

use prepd_api::{
    auth::BearerAuthenticator,
    rest::{RequestBuilderExt, RestClient},
};
use prepd_api_core::{
    def::{
        AppAuthApi, StudentChatApi, StudentExamApi, StudentSupportApi,
        StudentWalletApi,
    },
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

/// The client to the gateway's unauthenticated endpoints.
#[derive(Clone)]
pub struct GatewayClient {
    rest: RestClient,
    gateway_url: String,
}

/// The client to the authenticated student API.
pub struct StudentClient {
    rest: RestClient,
    gateway_client: GatewayClient,
    gateway_url: String,
    authenticator: Arc<BearerAuthenticator>,
}

// --- impl GatewayClient --- //

impl GatewayClient {
    pub fn new(gateway_url: String, user_agent: &'static str) -> Self {
        let rest = RestClient::new(user_agent, "gateway");
        Self { rest, gateway_url }
    }

    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }
}

impl AppAuthApi for GatewayClient {
    async fn signup(
        &self,
        req: SignupRequest,
    ) -> Result<AuthResponse, BackendApiError> {
        let gateway_url = &self.gateway_url;
        let url = format!("{gateway_url}/student/signup");
        let req = self.rest.post(url, &req);
        self.rest.send(req).await
    }

    async fn login(
        &self,
        req: LoginRequest,
    ) -> Result<AuthResponse, BackendApiError> {
        let gateway_url = &self.gateway_url;
        let url = format!("{gateway_url}/student/login");
        let req = self.rest.post(url, &req);
        self.rest.send(req).await
    }

    async fn refresh_token(
        &self,
        req: TokenRefreshRequest,
    ) -> Result<TokenRefreshResponse, BackendApiError> {
        let gateway_url = &self.gateway_url;
        let url = format!("{gateway_url}/student/token/refresh");
        let req = self.rest.post(url, &req);
        self.rest.send(req).await
    }
}

// --- impl StudentClient --- //

impl StudentClient {
    pub fn new(
        gateway_client: GatewayClient,
        authenticator: Arc<BearerAuthenticator>,
    ) -> Self {
        let rest = RestClient::new(
            gateway_client.rest.user_agent().clone(),
            "backend",
        );
        let gateway_url = gateway_client.gateway_url.clone();
        Self {
            rest,
            gateway_client,
            gateway_url,
            authenticator,
        }
    }

    pub fn authenticator(&self) -> &Arc<BearerAuthenticator> {
        &self.authenticator
    }

    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway_client
    }

    /// Get a fresh access token, refreshing through the gateway if needed.
    async fn access_token(&self) -> Result<String, BackendApiError> {
        self.authenticator
            .get_token(&self.gateway_client, SystemTime::now())
            .await
    }
}

impl StudentExamApi for StudentClient {
    async fn list_practice_exams(
        &self,
    ) -> Result<VecPracticeExam, BackendApiError> {
        let token = self.access_token().await?;
        let gateway_url = &self.gateway_url;
        let url = format!("{gateway_url}/student/practice-exams");
        let req = self.rest.get(url, &Empty {}).bearer_auth_token(&token);
        self.rest.send(req).await
    }

    async fn get_exam_questions(
        &self,
        exam_id: ExamId,
    ) -> Result<ExamQuestions, BackendApiError> {
        let token = self.access_token().await?;
        let gateway_url = &self.gateway_url;
        let url =
            format!("{gateway_url}/student/practice-exams/{exam_id}/questions");
        let req = self.rest.get(url, &Empty {}).bearer_auth_token(&token);
        self.rest.send(req).await
    }

    async fn submit_exam(
        &self,
        exam_id: ExamId,
        req: SubmitExamRequest,
    ) -> Result<ExamResult, BackendApiError> {
        let token = self.access_token().await?;
        let gateway_url = &self.gateway_url;
        let url =
            format!("{gateway_url}/student/practice-exams/{exam_id}/submit");
        let req = self.rest.post(url, &req).bearer_auth_token(&token);
        self.rest.send(req).await
    }

    async fn get_leaderboard(
        &self,
        req: GetLeaderboard,
    ) -> Result<VecLeaderboardEntry, BackendApiError> {
        let token = self.access_token().await?;
        let gateway_url = &self.gateway_url;
        let url = format!("{gateway_url}/student/leaderboard");
        let req = self.rest.get(url, &req).bearer_auth_token(&token);
        self.rest.send(req).await
    }
}

impl StudentChatApi for StudentClient {
    async fn get_new_messages(
        &self,
        req: GetNewMessages,
    ) -> Result<VecMessage, BackendApiError> {
        let token = self.access_token().await?;
        let gateway_url = &self.gateway_url;
        let url = format!("{gateway_url}/student/messages");
        let req = self.rest.get(url, &req).bearer_auth_token(&token);
        self.rest.send(req).await
    }

    async fn send_message(
        &self,
        req: SendMessageRequest,
    ) -> Result<Message, BackendApiError> {
        let token = self.access_token().await?;
        let gateway_url = &self.gateway_url;
        let url = format!("{gateway_url}/student/messages");
        let req = self.rest.post(url, &req).bearer_auth_token(&token);
        self.rest.send(req).await
    }

    async fn list_message_requests(
        &self,
    ) -> Result<VecMessageRequest, BackendApiError> {
        let token = self.access_token().await?;
        let gateway_url = &self.gateway_url;
        let url = format!("{gateway_url}/student/message-requests");
        let req = self.rest.get(url, &Empty {}).bearer_auth_token(&token);
        self.rest.send(req).await
    }

    async fn accept_message_request(
        &self,
        req: MessageRequestAction,
    ) -> Result<Empty, BackendApiError> {
        let token = self.access_token().await?;
        let gateway_url = &self.gateway_url;
        let request_id = req.request_id;
        let url = format!(
            "{gateway_url}/student/message-requests/{request_id}/accept"
        );
        let req = self.rest.post(url, &Empty {}).bearer_auth_token(&token);
        self.rest.send(req).await
    }

    async fn reject_message_request(
        &self,
        req: MessageRequestAction,
    ) -> Result<Empty, BackendApiError> {
        let token = self.access_token().await?;
        let gateway_url = &self.gateway_url;
        let request_id = req.request_id;
        let url = format!(
            "{gateway_url}/student/message-requests/{request_id}/reject"
        );
        let req = self.rest.post(url, &Empty {}).bearer_auth_token(&token);
        self.rest.send(req).await
    }
}

impl StudentSupportApi for StudentClient {
    async fn list_tickets(&self) -> Result<VecTicket, BackendApiError> {
        let token = self.access_token().await?;
        let gateway_url = &self.gateway_url;
        let url = format!("{gateway_url}/student/support-tickets");
        let req = self.rest.get(url, &Empty {}).bearer_auth_token(&token);
        self.rest.send(req).await
    }

    async fn get_ticket(
        &self,
        req: GetTicket,
    ) -> Result<Ticket, BackendApiError> {
        let token = self.access_token().await?;
        let gateway_url = &self.gateway_url;
        let ticket_id = req.ticket_id;
        let url = format!("{gateway_url}/student/support-tickets/{ticket_id}");
        let req = self.rest.get(url, &Empty {}).bearer_auth_token(&token);
        self.rest.send(req).await
    }

    async fn create_ticket(
        &self,
        req: CreateTicketRequest,
    ) -> Result<Ticket, BackendApiError> {
        let token = self.access_token().await?;
        let gateway_url = &self.gateway_url;
        let url = format!("{gateway_url}/student/support-tickets");
        let req = self.rest.post(url, &req).bearer_auth_token(&token);
        self.rest.send(req).await
    }

    async fn create_reply(
        &self,
        ticket_id: TicketId,
        req: CreateReplyRequest,
    ) -> Result<Reply, BackendApiError> {
        let token = self.access_token().await?;
        let gateway_url = &self.gateway_url;
        let url = format!(
            "{gateway_url}/student/support-tickets/{ticket_id}/replies"
        );
        let req = self.rest.post(url, &req).bearer_auth_token(&token);
        self.rest.send(req).await
    }
}

impl StudentWalletApi for StudentClient {
    async fn get_wallet(&self) -> Result<WalletData, BackendApiError> {
        let token = self.access_token().await?;
        let gateway_url = &self.gateway_url;
        let url = format!("{gateway_url}/student/wallet");
        let req = self.rest.get(url, &Empty {}).bearer_auth_token(&token);
        self.rest.send(req).await
    }

    async fn list_transactions(
        &self,
    ) -> Result<VecTransaction, BackendApiError> {
        let token = self.access_token().await?;
        let gateway_url = &self.gateway_url;
        let url = format!("{gateway_url}/student/wallet/transactions");
        let req = self.rest.get(url, &Empty {}).bearer_auth_token(&token);
        self.rest.send(req).await
    }

    async fn top_up(
        &self,
        req: TopUpRequest,
    ) -> Result<TopUpResponse, BackendApiError> {
        let token = self.access_token().await?;
        let gateway_url = &self.gateway_url;
        let url = format!("{gateway_url}/student/wallet/topup");
        let req = self.rest.post(url, &req).bearer_auth_token(&token);
        self.rest.send(req).await
    }

    async fn get_kyc_state(&self) -> Result<KycState, BackendApiError> {
        let token = self.access_token().await?;
        let gateway_url = &self.gateway_url;
        let url = format!("{gateway_url}/student/wallet/kyc");
        let req = self.rest.get(url, &Empty {}).bearer_auth_token(&token);
        self.rest.send(req).await
    }

    async fn submit_kyc(
        &self,
        req: SubmitKycRequest,
    ) -> Result<Empty, BackendApiError> {
        let token = self.access_token().await?;
        let gateway_url = &self.gateway_url;
        let url = format!("{gateway_url}/student/wallet/kyc");
        let req = self.rest.post(url, &req).bearer_auth_token(&token);
        self.rest.send(req).await
    }
}
