//! Scheduling records and the messages they carry.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::SchedulerError;

/// Unique identifier of a scheduled message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A fully formed, transport-agnostic mail message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MailMessage {
    /// Sender address.
    pub from: String,
    /// Primary recipients.
    pub to: Vec<String>,
    /// Carbon-copy recipients.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,
    /// Blind carbon-copy recipients.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    #[serde(default)]
    pub text_body: String,
    /// Optional HTML alternative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
    /// Additional headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl MailMessage {
    /// Start a message from a sender with a subject.
    pub fn new(from: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            subject: subject.into(),
            ..Self::default()
        }
    }

    /// Add a primary recipient.
    #[must_use]
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to.push(address.into());
        self
    }

    /// Add a carbon-copy recipient.
    #[must_use]
    pub fn cc(mut self, address: impl Into<String>) -> Self {
        self.cc.push(address.into());
        self
    }

    /// Add a blind carbon-copy recipient.
    #[must_use]
    pub fn bcc(mut self, address: impl Into<String>) -> Self {
        self.bcc.push(address.into());
        self
    }

    /// Set the plain-text body.
    #[must_use]
    pub fn with_text(mut self, body: impl Into<String>) -> Self {
        self.text_body = body.into();
        self
    }

    /// Set the HTML body.
    #[must_use]
    pub fn with_html(mut self, body: impl Into<String>) -> Self {
        self.html_body = Some(body.into());
        self
    }

    /// Add or replace a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Total number of recipients across to/cc/bcc.
    #[must_use]
    pub fn recipient_count(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }

    /// Reject messages that can never be delivered.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.recipient_count() == 0 {
            return Err(SchedulerError::InvalidMessage("message has no recipients".into()));
        }
        if self.from.trim().is_empty() {
            return Err(SchedulerError::InvalidMessage("message has no sender".into()));
        }
        Ok(())
    }
}

/// What a record asks the transport to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MailPayload {
    /// Send the message as is.
    Plain {
        /// Message to send.
        message: MailMessage,
    },
    /// Render a template into the message before sending.
    Templated {
        /// Envelope and fallback content.
        message: MailMessage,
        /// Template to render.
        template_name: String,
        /// Model handed to the template engine.
        model: serde_json::Value,
    },
}

impl MailPayload {
    /// The envelope message regardless of kind.
    #[must_use]
    pub const fn message(&self) -> &MailMessage {
        match self {
            Self::Plain { message } | Self::Templated { message, .. } => message,
        }
    }

    /// Short label used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Plain { .. } => "plain",
            Self::Templated { .. } => "templated",
        }
    }
}

/// Ordering key of a record: `(scheduled time, assigned priority, id)`.
///
/// Lower sorts first, so lower priority numbers (higher priority) win ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueKey {
    /// Due instant, UTC milliseconds.
    pub scheduled_at_ms: u128,
    /// Band the record lives in.
    pub priority: u32,
    /// Tie breaker.
    pub id: RecordId,
}

/// A message scheduled for delivery. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingRecord {
    id: RecordId,
    payload: MailPayload,
    scheduled_at_ms: u128,
    desired_priority: u32,
    assigned_priority: u32,
}

impl SchedulingRecord {
    /// Create a record with a fresh id.
    #[must_use]
    pub fn new(
        payload: MailPayload,
        scheduled_at_ms: u128,
        desired_priority: u32,
        assigned_priority: u32,
    ) -> Self {
        Self::with_id(
            RecordId::new(),
            payload,
            scheduled_at_ms,
            desired_priority,
            assigned_priority,
        )
    }

    /// Create a record with a known id.
    #[must_use]
    pub const fn with_id(
        id: RecordId,
        payload: MailPayload,
        scheduled_at_ms: u128,
        desired_priority: u32,
        assigned_priority: u32,
    ) -> Self {
        Self {
            id,
            payload,
            scheduled_at_ms,
            desired_priority,
            assigned_priority,
        }
    }

    /// Record identifier.
    #[must_use]
    pub const fn id(&self) -> RecordId {
        self.id
    }

    /// What to send.
    #[must_use]
    pub const fn payload(&self) -> &MailPayload {
        &self.payload
    }

    /// Due instant, UTC milliseconds.
    #[must_use]
    pub const fn scheduled_at_ms(&self) -> u128 {
        self.scheduled_at_ms
    }

    /// Priority as requested by the caller.
    #[must_use]
    pub const fn desired_priority(&self) -> u32 {
        self.desired_priority
    }

    /// Priority after clamping to the configured levels.
    #[must_use]
    pub const fn assigned_priority(&self) -> u32 {
        self.assigned_priority
    }

    /// Ordering key within and across bands.
    #[must_use]
    pub const fn key(&self) -> QueueKey {
        QueueKey {
            scheduled_at_ms: self.scheduled_at_ms,
            priority: self.assigned_priority,
            id: self.id,
        }
    }
}
