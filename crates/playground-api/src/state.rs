use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;

use playground_db::Database;

use crate::error::ApiError;
use crate::generation::Generator;

pub type AppState = Arc<AppStateInner>;

/// Process-lifetime collaborators, built once at startup and handed to
/// every handler.
pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    /// Mark the identity cookie `Secure` (everywhere but local development).
    pub cookie_secure: bool,
    pub generator: Arc<dyn Generator>,
    /// Wall-clock ceiling for one streamed generation.
    pub generation_timeout: Duration,
}

/// Run a blocking database call off the async runtime.
pub async fn run_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> playground_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| ApiError::Internal(anyhow!("spawn_blocking join error: {}", e)))?
        .map_err(ApiError::from)
}
