//! Outbound mail transport abstraction.

use async_trait::async_trait;

use crate::core::record::MailMessage;
use crate::core::TransportError;

/// Hands messages to a mail server.
///
/// Implementations own rendering, attachment/inline resource assembly, and
/// any retry policy. The dispatch loop calls them one message at a time from
/// its own thread and never retries a failed send.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_mail_scheduler::core::{MailMessage, MailTransport, TransportError};
///
/// struct SmtpTransport { /* client */ }
///
/// #[async_trait]
/// impl MailTransport for SmtpTransport {
///     async fn send(&self, message: &MailMessage) -> Result<(), TransportError> {
///         // hand off to the SMTP client
///         Ok(())
///     }
///
///     async fn send_template(
///         &self,
///         message: &MailMessage,
///         template_name: &str,
///         model: &serde_json::Value,
///     ) -> Result<(), TransportError> {
///         // render, then hand off
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait MailTransport: Send + Sync + 'static {
    /// Send a fully formed message.
    async fn send(&self, message: &MailMessage) -> Result<(), TransportError>;

    /// Render `template_name` with `model` into `message`, then send it.
    async fn send_template(
        &self,
        message: &MailMessage,
        template_name: &str,
        model: &serde_json::Value,
    ) -> Result<(), TransportError>;
}
