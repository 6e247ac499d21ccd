//! Quota ledger - per-account send counters and limit checks
//!
//! Counter increments and resets both go through single SQL statements
//! in the account repository, so concurrent sends on the same account
//! serialize on the row and never lose an update.

use mailroute_common::types::AccountId;
use mailroute_common::Result;
use mailroute_storage::models::SenderAccount;
use mailroute_storage::repository::AccountRepositoryTrait;
use std::sync::Arc;
use tracing::{debug, info};

/// Which counters a scheduled reset zeroes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetScope {
    Hourly,
    Daily,
}

/// Ledger of per-account send quotas
#[derive(Clone)]
pub struct QuotaLedger {
    accounts: Arc<dyn AccountRepositoryTrait>,
}

impl QuotaLedger {
    /// Create a new ledger
    pub fn new(accounts: Arc<dyn AccountRepositoryTrait>) -> Self {
        Self { accounts }
    }

    /// Whether the account may send right now.
    ///
    /// True when the account is active and every configured limit still
    /// has headroom; an unset limit is unlimited.
    pub fn can_send(account: &SenderAccount) -> bool {
        if !account.is_active {
            return false;
        }

        if let Some(daily) = account.daily_limit {
            if account.emails_sent_today >= daily {
                debug!(
                    account = %account.name,
                    sent = account.emails_sent_today,
                    limit = daily,
                    "daily quota exhausted"
                );
                return false;
            }
        }

        if let Some(hourly) = account.hourly_limit {
            if account.emails_sent_this_hour >= hourly {
                debug!(
                    account = %account.name,
                    sent = account.emails_sent_this_hour,
                    limit = hourly,
                    "hourly quota exhausted"
                );
                return false;
            }
        }

        true
    }

    /// Count one confirmed send against the account.
    ///
    /// Called only after transport success.
    pub async fn record_send(&self, id: AccountId) -> Result<()> {
        self.accounts.record_send(id).await
    }

    /// Zero the counters in the given scope for every account.
    ///
    /// A reset racing an in-flight send goes through the same per-row
    /// update path as the increment; last writer wins, which is
    /// acceptable because resets are rare and idempotent.
    pub async fn reset_counters(&self, scope: ResetScope) -> Result<u64> {
        let affected = match scope {
            ResetScope::Hourly => self.accounts.reset_hourly().await?,
            ResetScope::Daily => self.accounts.reset_daily().await?,
        };

        info!(?scope, accounts = affected, "send counters reset");
        Ok(affected)
    }
}
