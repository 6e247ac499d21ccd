//! Tracking codec - hash generation, body rewriting, link resolution

use super::html;
use mailroute_common::types::{EmailId, EmailLogId};
use mailroute_common::Result;
use mailroute_storage::models::EmailLog;
use mailroute_storage::repository::{EmailLogRepositoryTrait, LinkMappingRepositoryTrait};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Keyed digest binding an emailId to a recipient: first 16 hex chars of
/// SHA-256 over `emailId|recipient|secret`. Deterministic and
/// non-reversible; it authenticates public tracking callbacks.
pub fn recipient_hash(secret: &str, email_id: &EmailId, recipient: &str) -> String {
    let digest = Sha256::digest(format!("{}|{}|{}", email_id, recipient, secret).as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Exact-match verification of a recipient hash.
///
/// Callers silently no-op on false; the public endpoints must behave
/// identically whether the emailId exists or not.
pub fn verify_recipient_hash(secret: &str, email_id: &EmailId, recipient: &str, hash: &str) -> bool {
    recipient_hash(secret, email_id, recipient) == hash
}

/// Unkeyed short identifier for a rewritten URL: first 8 hex chars of
/// SHA-256 over the literal URL.
pub fn link_hash(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(digest)[..8].to_string()
}

/// Tracking codec
#[derive(Clone)]
pub struct TrackingCodec {
    secret: String,
    logs: Arc<dyn EmailLogRepositoryTrait>,
    links: Arc<dyn LinkMappingRepositoryTrait>,
}

impl TrackingCodec {
    /// Create a new codec keyed with the tracking secret
    pub fn new(
        secret: String,
        logs: Arc<dyn EmailLogRepositoryTrait>,
        links: Arc<dyn LinkMappingRepositoryTrait>,
    ) -> Self {
        Self {
            secret,
            logs,
            links,
        }
    }

    /// Recipient hash for one message/recipient pair
    pub fn recipient_hash(&self, email_id: &EmailId, recipient: &str) -> String {
        recipient_hash(&self.secret, email_id, recipient)
    }

    /// Verify a hash received on a tracking callback
    pub fn verify(&self, email_id: &EmailId, recipient: &str, hash: &str) -> bool {
        verify_recipient_hash(&self.secret, email_id, recipient, hash)
    }

    /// Look up the log for a raw callback token and check the recipient
    /// hash against it. Returns the log only when both check out; a
    /// malformed token, unknown emailId, or wrong hash is `None`.
    pub async fn verify_callback(&self, email_id: &str, hash: &str) -> Result<Option<EmailLog>> {
        let Some(parsed) = EmailId::parse(email_id) else {
            return Ok(None);
        };
        let Some(log) = self.logs.get_by_email_id(parsed.as_str()).await? else {
            return Ok(None);
        };
        if self.verify(&parsed, &log.recipient, hash) {
            Ok(Some(log))
        } else {
            debug!(email_id = %parsed, "callback hash mismatch");
            Ok(None)
        }
    }

    /// Count an open for a verified callback.
    ///
    /// Nothing is recorded unless the hash verifies; the returned log,
    /// when present, has been counted.
    pub async fn record_open_if_verified(
        &self,
        email_id: &str,
        hash: &str,
    ) -> Result<Option<EmailLog>> {
        let Some(log) = self.verify_callback(email_id, hash).await? else {
            return Ok(None);
        };
        self.logs.record_open(log.id).await?;
        Ok(Some(log))
    }

    /// Insert the open-tracking pixel.
    ///
    /// The pixel URL carries a random cache-busting token so every
    /// render produces a distinct URL.
    pub fn inject_open_pixel(
        &self,
        html_body: &str,
        base_url: &str,
        email_id: &EmailId,
        hash: &str,
    ) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let pixel_url = format!(
            "{}/track/open/{}/{}?r={}",
            base_url.trim_end_matches('/'),
            email_id,
            hash,
            token
        );
        html::inject_pixel(html_body, &pixel_url)
    }

    /// Rewrite trackable links through the click endpoint, persisting one
    /// LinkMapping per distinct (message, hash) pair.
    pub async fn rewrite_links(
        &self,
        html_body: &str,
        email_log_id: EmailLogId,
        base_url: &str,
        email_id: &EmailId,
        hash: &str,
    ) -> Result<String> {
        let base = base_url.trim_end_matches('/');

        // First pass: discover URLs and persist mappings, deduplicated by
        // link hash. The same href appearing twice stores one row.
        let mut hashes: HashMap<String, String> = HashMap::new();
        let mut seen: HashSet<String> = HashSet::new();

        for url in html::collect_anchor_hrefs(html_body) {
            if !html::is_trackable_url(&url) {
                continue;
            }

            let lh = link_hash(&url);
            if seen.insert(lh.clone()) {
                self.links.upsert(email_log_id, &lh, &url).await?;
            }
            hashes.insert(url, lh);
        }

        if hashes.is_empty() {
            return Ok(html_body.to_string());
        }

        debug!(links = hashes.len(), %email_id, "rewrote tracked links");

        // Second pass: substitute hrefs.
        Ok(html::rewrite_anchor_hrefs(html_body, |url| {
            hashes
                .get(url)
                .map(|lh| format!("{}/track/click/{}/{}/{}", base, email_id, lh, hash))
        }))
    }

    /// Resolve a link for redirection, counting the click on the mapping.
    ///
    /// Every resolution counts; first_clicked_at is set only once.
    pub async fn resolve_link(&self, email_id: &str, link_hash: &str) -> Result<Option<String>> {
        let Some(log) = self.logs.get_by_email_id(email_id).await? else {
            return Ok(None);
        };
        self.links.resolve_and_count(log.id, link_hash).await
    }

    /// Look up a link without counting, for unverified callbacks that
    /// still need a redirect target.
    pub async fn peek_link(&self, email_id: &str, link_hash: &str) -> Result<Option<String>> {
        let Some(log) = self.logs.get_by_email_id(email_id).await? else {
            return Ok(None);
        };
        Ok(self
            .links
            .get(log.id, link_hash)
            .await?
            .map(|m| m.original_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use mailroute_common::types::AccountId;
    use mailroute_storage::models::{CreateEmailEvent, CreateEmailLog, LinkMapping};
    use mailroute_storage::repository::LogStats;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    const SECRET: &str = "server-secret";

    fn email_id() -> EmailId {
        EmailId::parse("abc123abc123abc123abc123abc123ab").unwrap()
    }

    #[test]
    fn test_recipient_hash_round_trip() {
        let id = email_id();
        let hash = recipient_hash(SECRET, &id, "user@example.com");
        assert_eq!(hash.len(), 16);
        assert!(verify_recipient_hash(SECRET, &id, "user@example.com", &hash));
    }

    #[test]
    fn test_recipient_hash_deterministic() {
        let id = email_id();
        assert_eq!(
            recipient_hash(SECRET, &id, "user@example.com"),
            recipient_hash(SECRET, &id, "user@example.com")
        );
    }

    #[test]
    fn test_any_single_char_mutation_fails() {
        let id = email_id();
        let hash = recipient_hash(SECRET, &id, "user@example.com");

        for i in 0..hash.len() {
            let mut mutated: Vec<char> = hash.chars().collect();
            mutated[i] = if mutated[i] == '0' { '1' } else { '0' };
            let mutated: String = mutated.into_iter().collect();
            assert!(!verify_recipient_hash(
                SECRET,
                &id,
                "user@example.com",
                &mutated
            ));
        }
    }

    #[test]
    fn test_hash_binds_recipient_and_secret() {
        let id = email_id();
        let hash = recipient_hash(SECRET, &id, "user@example.com");
        assert!(!verify_recipient_hash(SECRET, &id, "other@example.com", &hash));
        assert!(!verify_recipient_hash("wrong", &id, "user@example.com", &hash));
    }

    #[test]
    fn test_link_hash_shape() {
        let h = link_hash("https://example.com/x");
        assert_eq!(h.len(), 8);
        assert!(h.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(h, link_hash("https://example.com/x"));
        assert_ne!(h, link_hash("https://example.com/y"));
    }

    // ---- in-memory fakes for the callback paths ----

    #[derive(Default)]
    struct FakeLogs {
        rows: Mutex<Vec<EmailLog>>,
    }

    #[async_trait]
    impl EmailLogRepositoryTrait for FakeLogs {
        async fn create(&self, input: CreateEmailLog) -> Result<EmailLog> {
            let log = EmailLog {
                id: Uuid::new_v4(),
                email_id: input.email_id,
                recipient: input.recipient,
                subject: input.subject,
                account_id: None,
                template_id: input.template_id,
                status: "pending".to_string(),
                error: None,
                open_count: 0,
                click_count: 0,
                first_opened_at: None,
                last_opened_at: None,
                bounced: false,
                sent_at: Utc::now(),
            };
            self.rows.lock().unwrap().push(log.clone());
            Ok(log)
        }

        async fn get_by_email_id(&self, email_id: &str) -> Result<Option<EmailLog>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|l| l.email_id == email_id)
                .cloned())
        }

        async fn mark_sent(&self, _id: EmailLogId, _account_id: Option<AccountId>) -> Result<()> {
            Ok(())
        }

        async fn mark_failed(&self, _id: EmailLogId, _error: &str) -> Result<()> {
            Ok(())
        }

        async fn record_open(&self, id: EmailLogId) -> Result<()> {
            let mut rows = self.rows.lock().unwrap();
            if let Some(l) = rows.iter_mut().find(|l| l.id == id) {
                l.open_count += 1;
                let now = Utc::now();
                l.first_opened_at.get_or_insert(now);
                l.last_opened_at = Some(now);
            }
            Ok(())
        }

        async fn record_click(&self, id: EmailLogId) -> Result<()> {
            let mut rows = self.rows.lock().unwrap();
            if let Some(l) = rows.iter_mut().find(|l| l.id == id) {
                l.click_count += 1;
            }
            Ok(())
        }

        async fn add_event(&self, _input: CreateEmailEvent) -> Result<()> {
            Ok(())
        }

        async fn purge_older_than(&self, _days: i64) -> Result<u64> {
            Ok(0)
        }

        async fn stats(&self) -> Result<LogStats> {
            Ok(LogStats {
                total: 0,
                sent: 0,
                failed: 0,
                total_opens: 0,
                total_clicks: 0,
            })
        }
    }

    #[derive(Default)]
    struct FakeLinks {
        mappings: Mutex<Vec<LinkMapping>>,
    }

    #[async_trait]
    impl LinkMappingRepositoryTrait for FakeLinks {
        async fn upsert(&self, email_log_id: EmailLogId, link_hash: &str, url: &str) -> Result<()> {
            let mut mappings = self.mappings.lock().unwrap();
            if let Some(m) = mappings
                .iter_mut()
                .find(|m| m.email_log_id == email_log_id && m.link_hash == link_hash)
            {
                m.original_url = url.to_string();
            } else {
                mappings.push(LinkMapping {
                    id: Uuid::new_v4(),
                    email_log_id,
                    link_hash: link_hash.to_string(),
                    original_url: url.to_string(),
                    click_count: 0,
                    first_clicked_at: None,
                    last_clicked_at: None,
                    created_at: Utc::now(),
                });
            }
            Ok(())
        }

        async fn get(
            &self,
            email_log_id: EmailLogId,
            link_hash: &str,
        ) -> Result<Option<LinkMapping>> {
            Ok(self
                .mappings
                .lock()
                .unwrap()
                .iter()
                .find(|m| m.email_log_id == email_log_id && m.link_hash == link_hash)
                .cloned())
        }

        async fn resolve_and_count(
            &self,
            email_log_id: EmailLogId,
            link_hash: &str,
        ) -> Result<Option<String>> {
            let mut mappings = self.mappings.lock().unwrap();
            Ok(mappings
                .iter_mut()
                .find(|m| m.email_log_id == email_log_id && m.link_hash == link_hash)
                .map(|m| {
                    m.click_count += 1;
                    let now = Utc::now();
                    m.first_clicked_at.get_or_insert(now);
                    m.last_clicked_at = Some(now);
                    m.original_url.clone()
                }))
        }
    }

    struct CallbackFixture {
        codec: TrackingCodec,
        logs: Arc<FakeLogs>,
        links: Arc<FakeLinks>,
        log_id: EmailLogId,
        hash: String,
    }

    async fn callback_fixture() -> CallbackFixture {
        let logs = Arc::new(FakeLogs::default());
        let links = Arc::new(FakeLinks::default());
        let codec = TrackingCodec::new(SECRET.to_string(), logs.clone(), links.clone());

        let log = logs
            .create(CreateEmailLog {
                email_id: email_id().as_str().to_string(),
                recipient: "user@example.com".to_string(),
                subject: "Test".to_string(),
                template_id: None,
            })
            .await
            .unwrap();

        let hash = codec.recipient_hash(&email_id(), "user@example.com");

        CallbackFixture {
            codec,
            logs,
            links,
            log_id: log.id,
            hash,
        }
    }

    #[tokio::test]
    async fn test_verified_open_counts() {
        let f = callback_fixture().await;

        let counted = f
            .codec
            .record_open_if_verified(email_id().as_str(), &f.hash)
            .await
            .unwrap();
        assert!(counted.is_some());

        let rows = f.logs.rows.lock().unwrap();
        assert_eq!(rows[0].open_count, 1);
        assert!(rows[0].first_opened_at.is_some());
    }

    #[tokio::test]
    async fn test_wrong_hash_records_nothing() {
        let f = callback_fixture().await;

        let counted = f
            .codec
            .record_open_if_verified(email_id().as_str(), "0000000000000000")
            .await
            .unwrap();
        assert!(counted.is_none());

        let rows = f.logs.rows.lock().unwrap();
        assert_eq!(rows[0].open_count, 0);
        assert!(rows[0].first_opened_at.is_none());
    }

    #[tokio::test]
    async fn test_verify_callback_rejects_junk_and_unknown_tokens() {
        let f = callback_fixture().await;

        assert!(f.codec.verify_callback("not-hex", &f.hash).await.unwrap().is_none());
        assert!(f
            .codec
            .verify_callback("ffffffffffffffffffffffffffffffff", &f.hash)
            .await
            .unwrap()
            .is_none());

        let verified = f
            .codec
            .verify_callback(email_id().as_str(), &f.hash)
            .await
            .unwrap();
        assert_eq!(verified.unwrap().id, f.log_id);
    }

    #[tokio::test]
    async fn test_resolve_link_counts_every_resolution() {
        let f = callback_fixture().await;
        f.links
            .upsert(f.log_id, "abcd1234", "https://example.com/page")
            .await
            .unwrap();

        let first = f
            .codec
            .resolve_link(email_id().as_str(), "abcd1234")
            .await
            .unwrap();
        assert_eq!(first.as_deref(), Some("https://example.com/page"));

        let first_clicked_at = {
            let mappings = f.links.mappings.lock().unwrap();
            assert_eq!(mappings[0].click_count, 1);
            mappings[0].first_clicked_at.unwrap()
        };

        let second = f
            .codec
            .resolve_link(email_id().as_str(), "abcd1234")
            .await
            .unwrap();
        assert_eq!(second.as_deref(), Some("https://example.com/page"));

        let mappings = f.links.mappings.lock().unwrap();
        assert_eq!(mappings[0].click_count, 2);
        assert_eq!(mappings[0].first_clicked_at, Some(first_clicked_at));
    }

    #[tokio::test]
    async fn test_peek_link_never_counts() {
        let f = callback_fixture().await;
        f.links
            .upsert(f.log_id, "abcd1234", "https://example.com/page")
            .await
            .unwrap();

        let url = f
            .codec
            .peek_link(email_id().as_str(), "abcd1234")
            .await
            .unwrap();
        assert_eq!(url.as_deref(), Some("https://example.com/page"));

        let mappings = f.links.mappings.lock().unwrap();
        assert_eq!(mappings[0].click_count, 0);
        assert!(mappings[0].first_clicked_at.is_none());
    }
}
