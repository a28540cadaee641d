//! Payment Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// A required input field is missing or malformed
    #[error("validation error: {0}")]
    Validation(String),

    /// Webhook secret or signature did not check out
    #[error("webhook authentication failed: {0}")]
    WebhookAuth(String),

    /// Webhook payload could not be decoded
    #[error("webhook parse error: {0}")]
    WebhookParse(String),

    /// Gift record not found
    #[error("gift not found: {0}")]
    NotFound(String),

    /// Upstream payment provider call failed
    #[error("provider error: {0}")]
    Provider(String),

    /// Storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Get user-friendly message
    ///
    /// Provider and storage details never reach the purchaser; they get a
    /// generic retry message instead.
    pub fn user_message(&self) -> &str {
        match self {
            PaymentError::Validation(_) => "Some required information is missing.",
            PaymentError::NotFound(_) => "This gift page does not exist.",
            PaymentError::Config(_) => "Payments are not available right now.",
            _ => "Payment processing failed. Please try again.",
        }
    }
}
