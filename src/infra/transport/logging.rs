//! Transport that only logs, for development and dry runs.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::core::{MailMessage, MailTransport, TransportError};

/// Logs every message at `info` instead of sending it.
#[derive(Debug, Default)]
pub struct LoggingTransport {
    sent: AtomicU64,
}

impl LoggingTransport {
    /// Create a transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages "sent" so far.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MailTransport for LoggingTransport {
    async fn send(&self, message: &MailMessage) -> Result<(), TransportError> {
        self.sent.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            from = %message.from,
            recipients = message.recipient_count(),
            subject = %message.subject,
            "mail sent (logging transport)"
        );
        Ok(())
    }

    async fn send_template(
        &self,
        message: &MailMessage,
        template_name: &str,
        model: &serde_json::Value,
    ) -> Result<(), TransportError> {
        if template_name.trim().is_empty() {
            return Err(TransportError::Template("empty template name".into()));
        }
        self.sent.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            from = %message.from,
            recipients = message.recipient_count(),
            subject = %message.subject,
            template = template_name,
            model = %model,
            "templated mail sent (logging transport)"
        );
        Ok(())
    }
}
