//! Mailroute Storage - Database abstraction
//!
//! This crate provides the PostgreSQL persistence layer for Mailroute:
//! sender accounts, routing rules, the outbound message log with its
//! tracking events and link mappings, and the mailer settings singleton.

pub mod db;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
