//! Shared application state

use mailroute_core::{DeliveryDispatcher, TrackingCodec};
use mailroute_storage::repository::{AccountRepositoryTrait, EmailLogRepositoryTrait};
use mailroute_storage::DatabasePool;
use std::sync::Arc;

/// State shared by every handler
pub struct AppState {
    pub db_pool: DatabasePool,
    pub dispatcher: DeliveryDispatcher,
    pub codec: TrackingCodec,
    pub logs: Arc<dyn EmailLogRepositoryTrait>,
    pub accounts: Arc<dyn AccountRepositoryTrait>,
}
