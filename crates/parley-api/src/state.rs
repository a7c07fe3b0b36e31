use std::sync::Arc;

use tracing::error;

use parley_db::Database;

use crate::error::ApiError;
use crate::llm::ChatModel;
use crate::session::SessionIssuer;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub sessions: SessionIssuer,
    pub model: Box<dyn ChatModel>,
}

impl AppStateInner {
    pub fn new(db: Database, sessions: SessionIssuer, model: Box<dyn ChatModel>) -> AppState {
        Arc::new(Self {
            db,
            sessions,
            model,
        })
    }
}

/// Run blocking work (SQLite, password hashing) off the async runtime.
pub async fn blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
    })?
}
