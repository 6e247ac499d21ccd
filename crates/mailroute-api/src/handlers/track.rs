//! Tracking callback handlers
//!
//! These endpoints are unauthenticated by nature: mail clients and link
//! scanners hit them with whatever is in the message. The open callback
//! always answers with the pixel, and the click callback always tries to
//! redirect, so an outside caller cannot distinguish a real token from a
//! guessed one. Counters only move when the recipient hash verifies.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use mailroute_common::types::EmailId;
use mailroute_storage::models::{CreateEmailEvent, EventType};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::state::AppState;

/// 1x1 transparent GIF served on every open callback
const TRACKING_PIXEL: [u8; 43] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

#[derive(Debug, Deserialize)]
pub struct ClickParams {
    /// Legacy fallback target carried in the rewritten URL
    pub url: Option<String>,
}

fn pixel_response() -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-store, no-cache, max-age=0"),
        ],
        TRACKING_PIXEL.to_vec(),
    )
        .into_response()
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Record an email open
///
/// GET /track/open/:email_id/:hash
///
/// Always answers with the tracking pixel, whether or not the token
/// verifies or even exists.
pub async fn track_open(
    State(state): State<Arc<AppState>>,
    Path((email_id, hash)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let log = match state.codec.record_open_if_verified(&email_id, &hash).await {
        Ok(Some(log)) => log,
        Ok(None) => {
            debug!(%email_id, "open callback with bad or unknown token");
            return pixel_response();
        }
        Err(e) => {
            warn!(%email_id, "failed to record open: {}", e);
            return pixel_response();
        }
    };

    if let Err(e) = state
        .logs
        .add_event(CreateEmailEvent {
            email_log_id: log.id,
            event_type: EventType::Open,
            ip_address: client_ip(&headers),
            user_agent: user_agent(&headers),
            link_url: None,
        })
        .await
    {
        warn!(%email_id, "failed to record open event: {}", e);
    }

    pixel_response()
}

/// Record a link click and redirect
///
/// GET /track/click/:email_id/:link_hash/:hash
///
/// A verified hash counts the click and resolves the stored mapping. An
/// unverified hash still redirects when a target is known, so the
/// recipient never lands on an error page, but nothing is counted.
/// 404 only when no target can be found at all.
pub async fn track_click(
    State(state): State<Arc<AppState>>,
    Path((email_id, link_hash, hash)): Path<(String, String, String)>,
    Query(params): Query<ClickParams>,
    headers: HeaderMap,
) -> Response {
    let verified = match state.codec.verify_callback(&email_id, &hash).await {
        Ok(verified) => verified,
        Err(e) => {
            warn!(%email_id, "click lookup failed: {}", e);
            None
        }
    };

    if let Some(log) = verified {
        let target = match state.codec.resolve_link(log.email_id.as_str(), &link_hash).await {
            Ok(target) => target,
            Err(e) => {
                warn!(email_id = %log.email_id, "link resolution failed: {}", e);
                None
            }
        };

        if let Some(url) = target.or(params.url) {
            if let Err(e) = state.logs.record_click(log.id).await {
                warn!(email_id = %log.email_id, "failed to record click: {}", e);
            }
            if let Err(e) = state
                .logs
                .add_event(CreateEmailEvent {
                    email_log_id: log.id,
                    event_type: EventType::Click,
                    ip_address: client_ip(&headers),
                    user_agent: user_agent(&headers),
                    link_url: Some(url.clone()),
                })
                .await
            {
                warn!(email_id = %log.email_id, "failed to record click event: {}", e);
            }
            return Redirect::temporary(&url).into_response();
        }

        return (StatusCode::NOT_FOUND, "Unknown link").into_response();
    }

    // Unverified: redirect without counting.
    debug!(%email_id, "click callback with bad or unknown token");
    let target = match EmailId::parse(&email_id) {
        Some(id) => state
            .codec
            .peek_link(id.as_str(), &link_hash)
            .await
            .unwrap_or_default(),
        None => None,
    };

    match target.or(params.url) {
        Some(url) => Redirect::temporary(&url).into_response(),
        None => (StatusCode::NOT_FOUND, "Unknown link").into_response(),
    }
}
