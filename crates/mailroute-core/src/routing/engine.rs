//! Routing engine - account selection for outbound messages
//!
//! Evaluation order: an explicitly requested account first, then active
//! rules by ascending priority, then the channel's primary account, then
//! every active account by (priority, id). The first candidate that
//! passes the quota check wins; selection itself never mutates anything.

use crate::quota::QuotaLedger;
use mailroute_common::types::{Channel, OutboundMessage};
use mailroute_common::{Error, Result};
use mailroute_storage::models::{MatchSpec, SenderAccount};
use mailroute_storage::repository::{AccountRepositoryTrait, RuleRepositoryTrait};
use std::sync::Arc;
use tracing::{debug, warn};

/// Recursive evaluator for rule match specifications.
///
/// String comparisons are case-insensitive; a missing message field
/// never matches.
pub fn spec_matches(spec: &MatchSpec, message: &OutboundMessage) -> bool {
    match spec {
        MatchSpec::FieldEquals { field, value } => message
            .field(field)
            .is_some_and(|v| v.eq_ignore_ascii_case(value)),
        MatchSpec::FieldContains { field, value } => message
            .field(field)
            .is_some_and(|v| v.to_lowercase().contains(&value.to_lowercase())),
        MatchSpec::All { specs } => specs.iter().all(|s| spec_matches(s, message)),
        MatchSpec::Any { specs } => specs.iter().any(|s| spec_matches(s, message)),
    }
}

/// Order active accounts for the unconditional fallback: the channel's
/// primary first, then the channel's remaining accounts by (priority, id)
/// ascending. Accounts on another channel are never candidates.
///
/// The input is assumed already sorted by (priority, id), which is how
/// the repository returns it.
pub fn fallback_order<'a>(
    accounts: &'a [SenderAccount],
    channel: Channel,
) -> Vec<&'a SenderAccount> {
    let mut ordered: Vec<&SenderAccount> = Vec::with_capacity(accounts.len());

    for account in accounts {
        if account.is_primary && account.channel_enum() == channel {
            ordered.push(account);
        }
    }
    for account in accounts {
        if !account.is_primary && account.channel_enum() == channel {
            ordered.push(account);
        }
    }

    ordered
}

/// Routing engine
pub struct RoutingEngine {
    accounts: Arc<dyn AccountRepositoryTrait>,
    rules: Arc<dyn RuleRepositoryTrait>,
}

impl RoutingEngine {
    /// Create a new routing engine
    pub fn new(
        accounts: Arc<dyn AccountRepositoryTrait>,
        rules: Arc<dyn RuleRepositoryTrait>,
    ) -> Self {
        Self { accounts, rules }
    }

    /// Select the sending account for a message.
    ///
    /// Fails with [`Error::NoAccountAvailable`] when every candidate is
    /// inactive or over quota.
    pub async fn select_account(&self, message: &OutboundMessage) -> Result<SenderAccount> {
        let active = self.accounts.list_active().await?;

        // Named candidates: explicit request, then matching rules in
        // priority order.
        let mut names: Vec<String> = Vec::new();
        if let Some(requested) = &message.account_name {
            names.push(requested.clone());
        }

        for rule in self.rules.list_active().await? {
            let Some(spec) = rule.spec() else {
                warn!(rule = %rule.name, "skipping rule with malformed match spec");
                continue;
            };

            if spec_matches(&spec, message) {
                debug!(rule = %rule.name, account = %rule.account_name, "rule matched");
                names.push(rule.account_name.clone());
            }
        }

        for name in &names {
            if let Some(account) = active.iter().find(|a| &a.name == name) {
                if QuotaLedger::can_send(account) {
                    return Ok(account.clone());
                }
                debug!(account = %name, "candidate over quota, trying next");
            } else {
                debug!(account = %name, "candidate account missing or inactive");
            }
        }

        // Unconditional priority fallback.
        for account in fallback_order(&active, message.channel) {
            if QuotaLedger::can_send(account) {
                return Ok(account.clone());
            }
        }

        Err(Error::NoAccountAvailable(format!(
            "no active account under quota for recipient {}",
            message.to
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn message(to: &str, subject: &str) -> OutboundMessage {
        OutboundMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            html_body: None,
            text_body: None,
            headers: Default::default(),
            attachments: Vec::new(),
            account_name: None,
            channel: Channel::Email,
            template_id: None,
        }
    }

    fn account(name: &str, priority: i32, primary: bool) -> SenderAccount {
        SenderAccount {
            id: uuid::Uuid::new_v4(),
            name: name.to_string(),
            provider: "smtp".to_string(),
            channel: "email".to_string(),
            from_email: format!("{}@example.com", name),
            from_name: None,
            priority,
            is_active: true,
            is_primary: primary,
            daily_limit: None,
            hourly_limit: None,
            emails_sent_today: 0,
            emails_sent_this_hour: 0,
            total_emails_sent: 0,
            encrypted_config: None,
            encrypted_oauth: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_field_equals_case_insensitive() {
        let spec = MatchSpec::FieldEquals {
            field: "to_domain".to_string(),
            value: "Example.COM".to_string(),
        };
        assert!(spec_matches(&spec, &message("user@example.com", "hi")));
        assert!(!spec_matches(&spec, &message("user@other.org", "hi")));
    }

    #[test]
    fn test_field_contains() {
        let spec = MatchSpec::FieldContains {
            field: "subject".to_string(),
            value: "INVOICE".to_string(),
        };
        assert!(spec_matches(&spec, &message("a@b.c", "Your invoice #42")));
        assert!(!spec_matches(&spec, &message("a@b.c", "Welcome")));
    }

    #[test]
    fn test_missing_field_never_matches() {
        let spec = MatchSpec::FieldEquals {
            field: "header:X-Absent".to_string(),
            value: "x".to_string(),
        };
        assert!(!spec_matches(&spec, &message("a@b.c", "hi")));
    }

    #[test]
    fn test_composite_all_and_any() {
        let all = MatchSpec::All {
            specs: vec![
                MatchSpec::FieldEquals {
                    field: "to_domain".to_string(),
                    value: "example.com".to_string(),
                },
                MatchSpec::FieldContains {
                    field: "subject".to_string(),
                    value: "report".to_string(),
                },
            ],
        };
        assert!(spec_matches(&all, &message("a@example.com", "Q3 report")));
        assert!(!spec_matches(&all, &message("a@example.com", "hello")));

        let any = MatchSpec::Any {
            specs: match all {
                MatchSpec::All { specs } => specs,
                _ => unreachable!(),
            },
        };
        assert!(spec_matches(&any, &message("a@example.com", "hello")));
        assert!(!spec_matches(&any, &message("a@other.org", "hello")));
    }

    #[test]
    fn test_empty_all_matches_everything() {
        assert!(spec_matches(&MatchSpec::match_all(), &message("a@b.c", "")));
        let empty_any = MatchSpec::Any { specs: Vec::new() };
        assert!(!spec_matches(&empty_any, &message("a@b.c", "")));
    }

    #[test]
    fn test_fallback_order_prefers_channel_primary() {
        let accounts = vec![
            account("first", 1, false),
            account("second", 2, true),
            account("third", 3, false),
        ];

        let ordered: Vec<&str> = fallback_order(&accounts, Channel::Email)
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(ordered, vec!["second", "first", "third"]);
    }

    #[test]
    fn test_fallback_order_skips_other_channel_accounts() {
        let mut wa = account("wa", 1, true);
        wa.channel = "whatsapp".to_string();
        let accounts = vec![wa, account("mail", 5, false)];

        // The whatsapp account never becomes an email candidate, even
        // though it outranks every email account.
        let ordered: Vec<&str> = fallback_order(&accounts, Channel::Email)
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(ordered, vec!["mail"]);

        let ordered: Vec<&str> = fallback_order(&accounts, Channel::Whatsapp)
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(ordered, vec!["wa"]);
    }
}
