//! Mailroute Core - Routing, quota, tracking and dispatch
//!
//! This crate provides the outbound mail engine for Mailroute: the
//! account selection engine with rule matching and quota enforcement,
//! the tracking codec with its public-callback hash scheme, the
//! credential vault, and the delivery dispatcher tying them together.

pub mod dispatch;
pub mod quota;
pub mod routing;
pub mod scheduled;
pub mod tracking;
pub mod transport;
pub mod vault;

pub use dispatch::{DeliveryDispatcher, FallbackTransport};
pub use quota::{QuotaLedger, ResetScope};
pub use routing::{spec_matches, RoutingEngine};
pub use scheduled::{Clock, ResetScheduler, SystemClock};
pub use tracking::{link_hash, recipient_hash, verify_recipient_hash, TrackingCodec};
pub use transport::{RenderedEmail, SmtpTransport, SmtpTransportFactory, Transport, TransportFactory};
pub use vault::CredentialVault;
