//! Database models

use chrono::{DateTime, Utc};
use mailroute_common::types::{
    AccountId, Channel, EmailLogId, EventId, LinkMappingId, RuleId, TemplateId,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Sending account model
///
/// Credentials live in the `encrypted_config` / `encrypted_oauth` columns
/// and are only ever handled through the credential vault.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SenderAccount {
    pub id: AccountId,
    pub name: String,
    pub provider: String,
    pub channel: String,
    pub from_email: String,
    pub from_name: Option<String>,
    pub priority: i32,
    pub is_active: bool,
    pub is_primary: bool,
    pub daily_limit: Option<i32>,
    pub hourly_limit: Option<i32>,
    pub emails_sent_today: i32,
    pub emails_sent_this_hour: i32,
    pub total_emails_sent: i64,
    pub encrypted_config: Option<String>,
    pub encrypted_oauth: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SenderAccount {
    /// Get the channel enum
    pub fn channel_enum(&self) -> Channel {
        Channel::parse(&self.channel).unwrap_or_default()
    }
}

/// Match specification of a routing rule.
///
/// The two historical rule styles (single field comparison and a structured
/// conditions blob) are two constructors of the same union; a single
/// recursive evaluator handles both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchSpec {
    /// Field equals a value (case-insensitive)
    FieldEquals { field: String, value: String },
    /// Field contains a substring (case-insensitive)
    FieldContains { field: String, value: String },
    /// All sub-specs must match; empty matches everything
    All { specs: Vec<MatchSpec> },
    /// At least one sub-spec must match
    Any { specs: Vec<MatchSpec> },
}

impl MatchSpec {
    /// A spec that matches every message
    pub fn match_all() -> Self {
        MatchSpec::All { specs: Vec::new() }
    }
}

/// Routing rule model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RoutingRule {
    pub id: RuleId,
    pub name: String,
    pub priority: i32,
    pub is_active: bool,
    /// Serialized [`MatchSpec`]
    pub match_spec: serde_json::Value,
    /// Name of the target account
    pub account_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoutingRule {
    /// Parse the stored match specification.
    ///
    /// Rules written by older admin versions may carry malformed JSON;
    /// those rules simply never match.
    pub fn spec(&self) -> Option<MatchSpec> {
        serde_json::from_value(self.match_spec.clone()).ok()
    }
}

/// Email log model - one row per outbound message
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmailLog {
    pub id: EmailLogId,
    /// Opaque tracking token, the only external handle to this row
    pub email_id: String,
    pub recipient: String,
    pub subject: String,
    pub account_id: Option<AccountId>,
    pub template_id: Option<TemplateId>,
    pub status: String,
    pub error: Option<String>,
    pub open_count: i32,
    pub click_count: i32,
    pub first_opened_at: Option<DateTime<Utc>>,
    pub last_opened_at: Option<DateTime<Utc>>,
    pub bounced: bool,
    pub sent_at: DateTime<Utc>,
}

/// Email log delivery status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailLogStatus {
    Pending,
    Sent,
    Failed,
}

impl EmailLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailLogStatus::Pending => "pending",
            EmailLogStatus::Sent => "sent",
            EmailLogStatus::Failed => "failed",
        }
    }
}

/// Input for creating an email log row
#[derive(Debug, Clone)]
pub struct CreateEmailLog {
    pub email_id: String,
    pub recipient: String,
    pub subject: String,
    pub template_id: Option<TemplateId>,
}

/// Tracking event model - append-only child of an email log
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmailEvent {
    pub id: EventId,
    pub email_log_id: EmailLogId,
    pub event_type: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub link_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Tracking event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Open,
    Click,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Open => "open",
            EventType::Click => "click",
        }
    }
}

/// Input for recording a tracking event
#[derive(Debug, Clone)]
pub struct CreateEmailEvent {
    pub email_log_id: EmailLogId,
    pub event_type: EventType,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub link_url: Option<String>,
}

/// Link mapping model - one rewritten URL inside one message
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LinkMapping {
    pub id: LinkMappingId,
    pub email_log_id: EmailLogId,
    /// First 8 hex chars of the URL digest
    pub link_hash: String,
    pub original_url: String,
    pub click_count: i32,
    pub first_clicked_at: Option<DateTime<Utc>>,
    pub last_clicked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Mailer settings singleton
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MailerSettings {
    pub id: i32,
    pub enable_open_tracking: bool,
    pub enable_link_tracking: bool,
    pub tracking_base_url: String,
    pub default_from_name: Option<String>,
    pub default_from_email: Option<String>,
    pub unsubscribe_url: Option<String>,
    pub enable_unsubscribe_header: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for MailerSettings {
    fn default() -> Self {
        Self {
            id: 1,
            enable_open_tracking: true,
            enable_link_tracking: true,
            tracking_base_url: "http://localhost:8080".to_string(),
            default_from_name: None,
            default_from_email: None,
            unsubscribe_url: None,
            enable_unsubscribe_header: false,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_match_spec_round_trip() {
        let spec = MatchSpec::Any {
            specs: vec![
                MatchSpec::FieldEquals {
                    field: "to_domain".to_string(),
                    value: "example.com".to_string(),
                },
                MatchSpec::FieldContains {
                    field: "subject".to_string(),
                    value: "invoice".to_string(),
                },
            ],
        };

        let value = serde_json::to_value(&spec).unwrap();
        let parsed: MatchSpec = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, spec);
    }

    #[test]
    fn test_rule_with_malformed_spec() {
        let rule = RoutingRule {
            id: uuid::Uuid::new_v4(),
            name: "broken".to_string(),
            priority: 1,
            is_active: true,
            match_spec: json!({"type": "no_such_variant"}),
            account_name: "primary".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(rule.spec().is_none());
    }

    #[test]
    fn test_match_spec_wire_format() {
        let value = json!({
            "type": "field_equals",
            "field": "channel",
            "value": "whatsapp"
        });

        let spec: MatchSpec = serde_json::from_value(value).unwrap();
        assert_eq!(
            spec,
            MatchSpec::FieldEquals {
                field: "channel".to_string(),
                value: "whatsapp".to_string(),
            }
        );
    }
}
