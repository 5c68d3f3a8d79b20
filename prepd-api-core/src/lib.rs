//! # `prepd-api-core`
//!
//! API definitions shared by the Prepd app core and any future Rust
//! services: domain types, request/response models, the serializable error
//! taxonomy, and trait definitions for every endpoint the student app
//! consumes.

/// API trait definitions.
pub mod def;
/// Serializable api error types and error kinds.
pub mod error;
/// Request / response types, as sent on the wire.
pub mod models;
/// Domain types and newtypes.
pub mod types;
