//! # `prepd-api`
//!
//! The client-side API plumbing shared by the app core: a JSON `RestClient`
//! conforming to the Prepd backend's conventions, the `BearerAuthenticator`
//! which keeps a fresh access token on hand, and the `WsClient` used for chat
//! push events.

/// `BearerAuthenticator`: access token caching and refresh.
pub mod auth;
/// `RestClient` and request send/receive helpers.
pub mod rest;
/// `WsClient`: the chat WebSocket connection.
pub mod ws;
