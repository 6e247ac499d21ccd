//! Delivery dispatcher - orchestrates one outbound send
//!
//! Sequence: create the log row with a fresh tracking token, route,
//! rewrite the body for tracking, hand off to the account's transport,
//! then count the send. Counters only move after confirmed transport
//! success. The only automatic remediation is a single attempt on the
//! platform fallback transport when routing itself fails; there are no
//! retry loops here - retry policy belongs to the caller.

use crate::quota::QuotaLedger;
use crate::routing::RoutingEngine;
use crate::tracking::TrackingCodec;
use crate::transport::{RenderedEmail, Transport, TransportFactory};
use crate::vault::CredentialVault;
use mailroute_common::types::{DeliveryReceipt, EmailId, OutboundMessage};
use mailroute_common::{Error, Result};
use mailroute_storage::models::{CreateEmailLog, EmailLog, MailerSettings, SenderAccount};
use mailroute_storage::repository::{EmailLogRepositoryTrait, SettingsRepositoryTrait};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The platform-default transport used when routing cannot resolve an
/// account
pub struct FallbackTransport {
    pub transport: Arc<dyn Transport>,
    pub from_email: String,
    pub from_name: Option<String>,
}

/// Delivery dispatcher
pub struct DeliveryDispatcher {
    logs: Arc<dyn EmailLogRepositoryTrait>,
    settings: Arc<dyn SettingsRepositoryTrait>,
    routing: RoutingEngine,
    quota: QuotaLedger,
    vault: CredentialVault,
    codec: TrackingCodec,
    factory: Arc<dyn TransportFactory>,
    fallback: Option<FallbackTransport>,
}

impl DeliveryDispatcher {
    /// Create a new dispatcher
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        logs: Arc<dyn EmailLogRepositoryTrait>,
        settings: Arc<dyn SettingsRepositoryTrait>,
        routing: RoutingEngine,
        quota: QuotaLedger,
        vault: CredentialVault,
        codec: TrackingCodec,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            logs,
            settings,
            routing,
            quota,
            vault,
            codec,
            factory,
            fallback: None,
        }
    }

    /// Install the platform-default transport for the routing-failure
    /// fallback path
    pub fn with_fallback(mut self, fallback: FallbackTransport) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Send one message
    pub async fn send(&self, message: OutboundMessage) -> Result<DeliveryReceipt> {
        if message.to.trim().is_empty() || !message.to.contains('@') {
            return Err(Error::Validation(format!(
                "invalid recipient address: {:?}",
                message.to
            )));
        }

        let email_id = EmailId::generate();
        let log = self
            .logs
            .create(CreateEmailLog {
                email_id: email_id.as_str().to_string(),
                recipient: message.to.clone(),
                subject: message.subject.clone(),
                template_id: message.template_id,
            })
            .await?;

        let settings = self.settings.get().await?;

        match self.routing.select_account(&message).await {
            Ok(account) => {
                self.send_via_account(&message, &email_id, &log, &settings, account)
                    .await
            }
            Err(Error::NoAccountAvailable(reason)) => match &self.fallback {
                Some(fallback) => {
                    info!(%email_id, %reason, "routing failed, using fallback transport");
                    self.send_via_fallback(&message, &email_id, &log, &settings, fallback)
                        .await
                }
                None => {
                    self.logs.mark_failed(log.id, &reason).await?;
                    Err(Error::NoAccountAvailable(reason))
                }
            },
            Err(e) => {
                self.logs.mark_failed(log.id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    async fn send_via_account(
        &self,
        message: &OutboundMessage,
        email_id: &EmailId,
        log: &EmailLog,
        settings: &MailerSettings,
        account: SenderAccount,
    ) -> Result<DeliveryReceipt> {
        let email = self
            .render(message, email_id, log, settings, &account.from_email, account.from_name.as_deref())
            .await?;

        // The column holds either a bare blob or a JSON container with
        // an "encrypted" key, depending on which version wrote it.
        let credentials = match &account.encrypted_config {
            Some(raw) => match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(field) => self.vault.decrypt_field(&field)?,
                Err(_) => self.vault.decrypt(raw)?,
            },
            None => None,
        };

        let transport = match self.factory.build(&account, credentials) {
            Ok(t) => t,
            Err(e) => {
                self.logs.mark_failed(log.id, &e.to_string()).await?;
                return Err(e);
            }
        };

        match transport.deliver(&email).await {
            Ok(()) => {
                if let Err(e) = self.quota.record_send(account.id).await {
                    warn!(account = %account.name, "failed to record send: {}", e);
                }
                self.logs.mark_sent(log.id, Some(account.id)).await?;

                debug!(%email_id, account = %account.name, "message dispatched");
                Ok(DeliveryReceipt {
                    email_id: email_id.clone(),
                    account_id: Some(account.id),
                    account_name: account.name,
                })
            }
            Err(e) => {
                self.logs.mark_failed(log.id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    /// Single attempt on the default transport; never loops.
    async fn send_via_fallback(
        &self,
        message: &OutboundMessage,
        email_id: &EmailId,
        log: &EmailLog,
        settings: &MailerSettings,
        fallback: &FallbackTransport,
    ) -> Result<DeliveryReceipt> {
        let email = self
            .render(
                message,
                email_id,
                log,
                settings,
                &fallback.from_email,
                fallback.from_name.as_deref(),
            )
            .await?;

        match fallback.transport.deliver(&email).await {
            Ok(()) => {
                self.logs.mark_sent(log.id, None).await?;
                Ok(DeliveryReceipt {
                    email_id: email_id.clone(),
                    account_id: None,
                    account_name: "fallback".to_string(),
                })
            }
            Err(e) => {
                self.logs.mark_failed(log.id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    /// Apply tracking rewrites and assemble the rendered email
    async fn render(
        &self,
        message: &OutboundMessage,
        email_id: &EmailId,
        log: &EmailLog,
        settings: &MailerSettings,
        from_email: &str,
        from_name: Option<&str>,
    ) -> Result<RenderedEmail> {
        let mut html_body = message.html_body.clone();

        if let Some(html) = html_body.take() {
            let mut html = html;

            if settings.enable_open_tracking || settings.enable_link_tracking {
                let hash = self.codec.recipient_hash(email_id, &message.to);

                if settings.enable_link_tracking {
                    html = self
                        .codec
                        .rewrite_links(
                            &html,
                            log.id,
                            &settings.tracking_base_url,
                            email_id,
                            &hash,
                        )
                        .await?;
                }

                if settings.enable_open_tracking {
                    html = self.codec.inject_open_pixel(
                        &html,
                        &settings.tracking_base_url,
                        email_id,
                        &hash,
                    );
                }
            }

            html_body = Some(html);
        }

        let mut headers: HashMap<String, String> = message.headers.clone();
        if settings.enable_unsubscribe_header {
            if let Some(url) = &settings.unsubscribe_url {
                headers.insert("List-Unsubscribe".to_string(), format!("<{}>", url));
                headers.insert(
                    "List-Unsubscribe-Post".to_string(),
                    "List-Unsubscribe=One-Click".to_string(),
                );
            }
        }

        let from_name = from_name
            .map(|s| s.to_string())
            .or_else(|| settings.default_from_name.clone());

        Ok(RenderedEmail {
            from_email: from_email.to_string(),
            from_name,
            to: message.to.clone(),
            subject: message.subject.clone(),
            html_body,
            text_body: message.text_body.clone(),
            headers,
            attachments: message.attachments.clone(),
        })
    }
}
