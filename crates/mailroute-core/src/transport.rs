//! Delivery transports
//!
//! A transport carries one rendered message to the wire. The production
//! implementation speaks SMTP through lettre, built per account from
//! decrypted provider config; tests inject fakes through the same trait.

use async_trait::async_trait;
use chrono::Utc;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use mailroute_common::config::FallbackSmtpConfig;
use mailroute_common::types::{Attachment, Channel};
use mailroute_common::{Error, Result};
use mailroute_storage::models::SenderAccount;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// A fully rendered outbound email, ready for the wire
#[derive(Debug, Clone)]
pub struct RenderedEmail {
    pub from_email: String,
    pub from_name: Option<String>,
    pub to: String,
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub headers: HashMap<String, String>,
    pub attachments: Vec<Attachment>,
}

/// One-shot message carrier
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, email: &RenderedEmail) -> Result<()>;
}

/// Builds a transport for a routed account from its decrypted credentials
pub trait TransportFactory: Send + Sync {
    fn build(
        &self,
        account: &SenderAccount,
        credentials: Option<serde_json::Value>,
    ) -> Result<Box<dyn Transport>>;
}

/// Decrypted SMTP provider configuration of an account
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpProviderConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default = "default_starttls")]
    pub use_starttls: bool,
}

fn default_port() -> u16 {
    587
}

fn default_starttls() -> bool {
    true
}

/// SMTP transport wrapping lettre
pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    hostname: String,
}

impl SmtpTransport {
    /// Build from decrypted account provider config
    pub fn from_provider_config(config: &SmtpProviderConfig, hostname: &str) -> Result<Self> {
        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| Error::Transport(format!("failed to create SMTP transport: {}", e)))?
        } else if config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| Error::Transport(format!("failed to create SMTP transport: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder.port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            mailer: builder.timeout(Some(Duration::from_secs(30))).build(),
            hostname: hostname.to_string(),
        })
    }

    /// Build the platform fallback transport from static configuration
    pub fn from_fallback_config(config: &FallbackSmtpConfig, hostname: &str) -> Result<Self> {
        let provider = SmtpProviderConfig {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            password: config.password.clone(),
            use_tls: false,
            use_starttls: config.use_starttls,
        };
        Self::from_provider_config(&provider, hostname)
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn deliver(&self, email: &RenderedEmail) -> Result<()> {
        let from: Address = email
            .from_email
            .parse()
            .map_err(|e| Error::Validation(format!("invalid sender address: {}", e)))?;
        let to: Address = email
            .to
            .parse()
            .map_err(|e| Error::Validation(format!("invalid recipient address: {}", e)))?;

        let envelope = Envelope::new(Some(from), vec![to])
            .map_err(|e| Error::Transport(format!("failed to build envelope: {}", e)))?;

        let raw = build_mime(email, &self.hostname);

        match self.mailer.send_raw(&envelope, &raw).await {
            Ok(response) => {
                debug!(to = %email.to, code = ?response.code(), "SMTP accepted message");
                Ok(())
            }
            Err(e) => Err(Error::Transport(e.to_string())),
        }
    }
}

/// SMTP-backed transport factory for routed accounts.
///
/// An account whose credentials did not decrypt has no usable transport;
/// that is reported as a transport error, never thrown out of the vault.
pub struct SmtpTransportFactory {
    hostname: String,
}

impl SmtpTransportFactory {
    pub fn new(hostname: String) -> Self {
        Self { hostname }
    }
}

impl TransportFactory for SmtpTransportFactory {
    fn build(
        &self,
        account: &SenderAccount,
        credentials: Option<serde_json::Value>,
    ) -> Result<Box<dyn Transport>> {
        if account.channel_enum() != Channel::Email {
            return Err(Error::Transport(format!(
                "account {} uses channel {} which this transport does not carry",
                account.name, account.channel
            )));
        }

        let Some(credentials) = credentials else {
            return Err(Error::Transport(format!(
                "account {} has no usable credential",
                account.name
            )));
        };

        let config: SmtpProviderConfig = serde_json::from_value(credentials).map_err(|e| {
            Error::Transport(format!(
                "account {} provider config is malformed: {}",
                account.name, e
            ))
        })?;

        Ok(Box::new(SmtpTransport::from_provider_config(
            &config,
            &self.hostname,
        )?))
    }
}

/// Build the RFC 5322 message bytes
pub fn build_mime(email: &RenderedEmail, hostname: &str) -> Vec<u8> {
    let mut message = String::new();

    let message_id = format!("<{}.{}@{}>", Uuid::new_v4(), Utc::now().timestamp(), hostname);
    message.push_str(&format!("Message-ID: {}\r\n", message_id));
    message.push_str(&format!(
        "Date: {}\r\n",
        Utc::now().format("%a, %d %b %Y %H:%M:%S +0000")
    ));

    match &email.from_name {
        Some(name) => message.push_str(&format!("From: {} <{}>\r\n", name, email.from_email)),
        None => message.push_str(&format!("From: {}\r\n", email.from_email)),
    }
    message.push_str(&format!("To: {}\r\n", email.to));
    message.push_str(&format!("Subject: {}\r\n", email.subject));

    for (name, value) in &email.headers {
        message.push_str(&format!("{}: {}\r\n", name, value));
    }

    message.push_str("MIME-Version: 1.0\r\n");

    let has_attachments = !email.attachments.is_empty();
    let has_both_parts = email.text_body.is_some() && email.html_body.is_some();

    if has_attachments || has_both_parts {
        let boundary = format!("----=_Part_{}", Uuid::new_v4().simple());

        if has_attachments {
            message.push_str(&format!(
                "Content-Type: multipart/mixed; boundary=\"{}\"\r\n",
                boundary
            ));
        } else {
            message.push_str(&format!(
                "Content-Type: multipart/alternative; boundary=\"{}\"\r\n",
                boundary
            ));
        }

        message.push_str("\r\n");

        if let Some(text) = &email.text_body {
            message.push_str(&format!("--{}\r\n", boundary));
            message.push_str("Content-Type: text/plain; charset=utf-8\r\n\r\n");
            message.push_str(text);
            message.push_str("\r\n");
        }

        if let Some(html) = &email.html_body {
            message.push_str(&format!("--{}\r\n", boundary));
            message.push_str("Content-Type: text/html; charset=utf-8\r\n\r\n");
            message.push_str(html);
            message.push_str("\r\n");
        }

        for attachment in &email.attachments {
            message.push_str(&format!("--{}\r\n", boundary));
            message.push_str(&format!(
                "Content-Type: {}; name=\"{}\"\r\n",
                attachment.content_type, attachment.filename
            ));
            message.push_str("Content-Transfer-Encoding: base64\r\n");
            message.push_str(&format!(
                "Content-Disposition: attachment; filename=\"{}\"\r\n\r\n",
                attachment.filename
            ));
            message.push_str(&attachment.content);
            message.push_str("\r\n");
        }

        message.push_str(&format!("--{}--\r\n", boundary));
    } else if let Some(html) = &email.html_body {
        message.push_str("Content-Type: text/html; charset=utf-8\r\n\r\n");
        message.push_str(html);
    } else if let Some(text) = &email.text_body {
        message.push_str("Content-Type: text/plain; charset=utf-8\r\n\r\n");
        message.push_str(text);
    } else {
        message.push_str("Content-Type: text/plain; charset=utf-8\r\n\r\n");
    }

    message.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn email() -> RenderedEmail {
        RenderedEmail {
            from_email: "sender@example.com".to_string(),
            from_name: Some("Sender".to_string()),
            to: "user@example.com".to_string(),
            subject: "Hello".to_string(),
            html_body: Some("<p>Hi</p>".to_string()),
            text_body: None,
            headers: HashMap::new(),
            attachments: Vec::new(),
        }
    }

    #[test]
    fn test_mime_simple_html() {
        let raw = String::from_utf8(build_mime(&email(), "mx.test")).unwrap();
        assert!(raw.contains("From: Sender <sender@example.com>\r\n"));
        assert!(raw.contains("To: user@example.com\r\n"));
        assert!(raw.contains("Subject: Hello\r\n"));
        assert!(raw.contains("Content-Type: text/html; charset=utf-8\r\n\r\n<p>Hi</p>"));
        assert!(raw.contains("@mx.test>"));
    }

    #[test]
    fn test_mime_multipart_alternative() {
        let mut e = email();
        e.text_body = Some("Hi".to_string());
        let raw = String::from_utf8(build_mime(&e, "mx.test")).unwrap();
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("Content-Type: text/plain; charset=utf-8"));
        assert!(raw.contains("Content-Type: text/html; charset=utf-8"));
    }

    #[test]
    fn test_mime_attachment() {
        let mut e = email();
        e.attachments.push(Attachment {
            filename: "report.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            content: "QUJD".to_string(),
        });
        let raw = String::from_utf8(build_mime(&e, "mx.test")).unwrap();
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("Content-Disposition: attachment; filename=\"report.pdf\""));
        assert!(raw.contains("QUJD"));
    }

    #[test]
    fn test_mime_custom_headers() {
        let mut e = email();
        e.headers.insert(
            "List-Unsubscribe".to_string(),
            "<https://example.com/u>".to_string(),
        );
        let raw = String::from_utf8(build_mime(&e, "mx.test")).unwrap();
        assert!(raw.contains("List-Unsubscribe: <https://example.com/u>\r\n"));
    }

    #[test]
    fn test_provider_config_defaults() {
        let config: SmtpProviderConfig =
            serde_json::from_value(serde_json::json!({"host": "smtp.example.com"})).unwrap();
        assert_eq!(config.port, 587);
        assert!(config.use_starttls);
        assert!(!config.use_tls);
    }
}
