//! Common types for Mailroute

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for sending accounts
pub type AccountId = Uuid;

/// Unique identifier for routing rules
pub type RuleId = Uuid;

/// Unique identifier for email log rows
pub type EmailLogId = Uuid;

/// Unique identifier for tracking events
pub type EventId = Uuid;

/// Unique identifier for link mappings
pub type LinkMappingId = Uuid;

/// Unique identifier for message templates
pub type TemplateId = Uuid;

/// Opaque token identifying one outbound message instance.
///
/// This is the only external handle to a message's tracking data. It is
/// 32 lowercase hex characters (128 random bits), so public tracking
/// callbacks cannot enumerate messages by guessing row ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailId(String);

impl EmailId {
    /// Generate a fresh random token
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Parse a token received from the outside
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() == 32 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(s.to_ascii_lowercase()))
        } else {
            None
        }
    }

    /// Get the token as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EmailId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery channel of a sending account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    #[default]
    Email,
    Whatsapp,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Whatsapp => "whatsapp",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Channel::Email),
            "whatsapp" => Some(Channel::Whatsapp),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An attachment carried inline with a send request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    /// Base64 encoded content
    pub content: String,
}

/// One outbound message as seen by the routing and dispatch layers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Recipient address
    pub to: String,

    /// Subject line
    pub subject: String,

    /// HTML body (tracking rewrites apply here)
    pub html_body: Option<String>,

    /// Plain text body
    pub text_body: Option<String>,

    /// Extra headers to set on the message
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,

    /// Inline attachments
    #[serde(default)]
    pub attachments: Vec<Attachment>,

    /// Explicitly requested account, bypassing rule matching
    pub account_name: Option<String>,

    /// Delivery channel
    #[serde(default)]
    pub channel: Channel,

    /// Template this message was rendered from, if any
    pub template_id: Option<TemplateId>,
}

impl OutboundMessage {
    /// Look up a matchable field of the message by name.
    ///
    /// Field names follow the rule grammar: `to`, `to_domain`, `subject`,
    /// `channel` and `header:<name>`.
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "to" => Some(self.to.clone()),
            "to_domain" => self.to.rsplit_once('@').map(|(_, d)| d.to_lowercase()),
            "subject" => Some(self.subject.clone()),
            "channel" => Some(self.channel.as_str().to_string()),
            _ => name
                .strip_prefix("header:")
                .and_then(|h| self.headers.get(h).cloned()),
        }
    }
}

/// Result of a successful dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Tracking token of the logged message
    pub email_id: EmailId,

    /// Account the message went out through; None when the fallback
    /// transport carried it
    pub account_id: Option<AccountId>,

    /// Human-readable account name, or "fallback"
    pub account_name: String,
}
