//! Routing Engine Module
//!
//! Matches outbound messages to sending accounts through administrator
//! rules, priority ordering, and quota availability.

mod engine;

pub use engine::{fallback_order, spec_matches, RoutingEngine};
