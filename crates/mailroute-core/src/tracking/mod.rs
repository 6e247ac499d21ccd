//! Tracking Module - delivery analytics codec
//!
//! Generates and verifies the hashes that authenticate public tracking
//! callbacks, and rewrites HTML bodies to embed them.

mod codec;
mod html;

pub use codec::{link_hash, recipient_hash, verify_recipient_hash, TrackingCodec};
pub use html::{inject_pixel, is_trackable_url, rewrite_anchor_hrefs};
