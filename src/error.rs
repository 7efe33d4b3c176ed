//! Domain error types.
//!
//! Plumbing code returns `anyhow::Result`; these enums name the failures
//! the conversation flow distinguishes between.

use thiserror::Error;

/// Failures that abort a chat turn and reach the transport layer.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("knowledge retrieval failed: {0:#}")]
    Retrieval(#[source] anyhow::Error),
    #[error("answer generation failed: {0:#}")]
    Generation(#[source] anyhow::Error),
}

/// Local validation failures during lead capture. Surfaced to the user as a
/// retry prompt, never as an error response.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LeadError {
    #[error("invalid email format: {0}")]
    InvalidEmailFormat(String),
}

/// Lead notification failures. Logged and swallowed by the controller.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("SMTP credentials are not fully configured")]
    NotConfigured,
    #[error("invalid mailbox address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("failed to build lead email: {0}")]
    Message(String),
    #[error("failed to deliver lead email: {0}")]
    Delivery(String),
}
