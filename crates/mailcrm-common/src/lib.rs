//! MailCRM Common - Shared types and utilities
//!
//! This crate provides configuration, the error taxonomy, shared identifier
//! and status types, and the webhook signature primitives used by every
//! MailCRM component.

pub mod config;
pub mod error;
pub mod signature;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
