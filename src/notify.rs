//! Outbound notification seam.
//!
//! The engine never talks to a mail server; it hands a [`Notification`]
//! to whatever [`NotificationSender`] it was constructed with. Delivery
//! failures are reported upward as `SendFailure` without rolling back
//! persisted state.

use serde_json::{Map, Value};
use thiserror::Error;

/// Template for the signup verification message.
pub const TEMPLATE_SIGNUP_CONFIRMATION: &str = "signup-confirmation";

/// Template for the password reset message.
pub const TEMPLATE_RESET_PASSWORD: &str = "reset-password";

/// Template for generic informational messages.
pub const TEMPLATE_INFO: &str = "info";

/// Delivery failure reported by a sender.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct SendError(pub String);

/// A rendered-template send request.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Recipient address.
    pub to: String,
    /// Message subject.
    pub subject: String,
    /// Template name resolved by the delivery pipeline.
    pub template: String,
    /// From mailbox, resolved from the engine configuration.
    pub from: String,
    /// Template context values.
    pub context: Map<String, Value>,
}

impl Notification {
    /// Create a notification with an empty context.
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        template: impl Into<String>,
        from: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            template: template.into(),
            from: from.into(),
            context: Map::new(),
        }
    }

    /// Add a context value for the template.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Delivery backend for notifications.
///
/// Implementations are expected to resolve the template name to a real
/// message body; the engine only supplies the context.
#[allow(async_fn_in_trait)]
pub trait NotificationSender {
    /// Deliver a notification.
    async fn send(&self, notification: &Notification) -> std::result::Result<(), SendError>;
}
