//! Billing Error Types

use capture_core::CoreError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, BillingError>;

/// Billing errors that propagate to the caller
#[derive(Error, Debug)]
pub enum BillingError {
    /// Stripe API error
    #[error("Stripe error: {0}")]
    Stripe(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persistence failure while applying an event
    #[error("Storage error: {0}")]
    Store(#[from] CoreError),
}

impl BillingError {
    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            BillingError::Stripe(_) => "Card payment unavailable. Please try again shortly.",
            BillingError::Config(_) => "Service configuration error.",
            BillingError::Store(_) => "An error occurred processing your request.",
        }
    }
}

/// Reasons a webhook payload does not yield a typed event
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WebhookError {
    /// Missing or garbled header, stale timestamp, or HMAC mismatch
    #[error("Webhook signature invalid: {0}")]
    InvalidSignature(String),

    /// Authentic event of a type we do not handle
    #[error("Unrecognized event type: {0}")]
    UnrecognizedEventType(String),

    /// Authentic event whose body cannot be decoded into the typed event
    #[error("Malformed event data: {0}")]
    MalformedEventData(String),
}
