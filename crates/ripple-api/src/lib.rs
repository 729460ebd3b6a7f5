pub mod chats;
pub mod error;
pub mod middleware;
pub mod posts;
pub mod social;
pub mod users;
pub mod webhook;

use std::sync::Arc;

use tracing::error;

use ripple_db::{Database, StoreResult};
use ripple_gateway::dispatcher::Dispatcher;

pub use error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    /// Shared with the gateway, which resolves Identify tokens against it.
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
    pub webhook_secret: String,
}

/// Run a store operation off the async runtime. Every handler goes through
/// here: rusqlite calls block, and the store serializes them internally.
pub(crate) async fn with_db<T, F>(state: AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::from)
}
