//! MailCRM API - REST API server
//!
//! This crate provides the HTTP surface of the dispatch core: API-key
//! authentication, owner-scoped send, campaign, draft and analytics
//! endpoints, and the provider webhook receiver.

pub mod auth;
pub mod handlers;
pub mod openapi;
pub mod routes;

pub use auth::AppState;
pub use openapi::create_openapi_routes;
pub use routes::create_router;
