//! Send message handler

use axum::{extract::State, http::StatusCode, Json};
use base64::Engine;
use mailroute_common::types::{Attachment, Channel, OutboundMessage};
use mailroute_common::Error;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::handlers::{error_response, ErrorResponse};
use crate::state::AppState;

/// Attachment in a send request
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentInput {
    pub filename: String,
    pub content_type: String,
    /// Base64 encoded content
    pub content: String,
}

/// Request body for sending a message
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    /// Recipient address
    pub to: String,
    /// Subject line
    pub subject: String,
    /// HTML body
    pub html: Option<String>,
    /// Plain text body
    pub text: Option<String>,
    /// Custom headers
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
    /// Attachments
    #[serde(default)]
    pub attachments: Vec<AttachmentInput>,
    /// Route through this account, bypassing rule matching
    pub account: Option<String>,
    /// Delivery channel, defaults to email
    pub channel: Option<String>,
    /// Template the body was rendered from, recorded on the log row
    pub template_id: Option<Uuid>,
}

/// Response after a successful dispatch
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageResponse {
    /// Tracking token of the logged message
    pub email_id: String,
    pub status: String,
    /// Account that carried the message
    pub account: String,
}

/// Validate email address format
fn is_valid_email(email: &str) -> bool {
    if let Some(at_pos) = email.rfind('@') {
        let domain = &email[at_pos + 1..];
        !email[..at_pos].is_empty() && !domain.is_empty() && domain.contains('.')
    } else {
        false
    }
}

/// Strip any path components a client smuggled into an attachment
/// filename; only the final segment survives.
fn sanitize_filename(filename: &str) -> String {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .to_string()
}

fn validation_error(message: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    error_response(&Error::Validation(message.into()))
}

/// Send a message
///
/// POST /api/v1/send
///
/// Validates the request, routes it through the configured accounts and
/// dispatches it synchronously. The response carries the tracking token.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(input): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>), (StatusCode, Json<ErrorResponse>)> {
    if !is_valid_email(&input.to) {
        return Err(validation_error(format!(
            "Invalid recipient email address: {}",
            input.to
        )));
    }

    if input.subject.trim().is_empty() {
        return Err(validation_error("Subject is required"));
    }

    if input.html.is_none() && input.text.is_none() {
        return Err(validation_error("Either html or text body is required"));
    }

    let channel = match &input.channel {
        Some(raw) => Channel::parse(raw)
            .ok_or_else(|| validation_error(format!("Unknown channel: {}", raw)))?,
        None => Channel::Email,
    };

    let mut attachments = Vec::with_capacity(input.attachments.len());
    for attachment in &input.attachments {
        let filename = sanitize_filename(&attachment.filename);
        if filename.is_empty() {
            return Err(validation_error(format!(
                "Invalid attachment filename: {}",
                attachment.filename
            )));
        }
        if base64::engine::general_purpose::STANDARD
            .decode(&attachment.content)
            .is_err()
        {
            return Err(validation_error(format!(
                "Attachment {} is not valid base64",
                filename
            )));
        }
        attachments.push(Attachment {
            filename,
            content_type: attachment.content_type.clone(),
            content: attachment.content.clone(),
        });
    }

    let message = OutboundMessage {
        to: input.to,
        subject: input.subject,
        html_body: input.html,
        text_body: input.text,
        headers: input.headers,
        attachments,
        account_name: input.account,
        channel,
        template_id: input.template_id,
    };

    let receipt = state
        .dispatcher
        .send(message)
        .await
        .map_err(|e| error_response(&e))?;

    Ok((
        StatusCode::OK,
        Json(SendMessageResponse {
            email_id: receipt.email_id.to_string(),
            status: "sent".to_string(),
            account: receipt.account_name,
        }),
    ))
}
