pub mod auth;
pub mod chat;
pub mod components;
pub mod error;
pub mod generation;
pub mod middleware;
pub mod pages;
pub mod sessions;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};

pub use state::{AppState, AppStateInner};

/// All routes, with the access guard in front of them. The guard itself
/// decides which paths it protects.
pub fn router(state: AppState) -> Router {
    let pages = Router::new()
        .route("/", get(pages::home))
        .route("/login", get(pages::login))
        .route("/signup", get(pages::signup))
        .route("/playground", get(pages::playground))
        .route("/playground/{*rest}", get(pages::playground))
        .route("/health", get(pages::health));

    let auth_routes = Router::new()
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me));

    let protected_routes = Router::new()
        .route(
            "/api/protected/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route(
            "/api/protected/sessions/{session_id}",
            get(sessions::get_session).patch(sessions::update_session),
        )
        .route(
            "/api/protected/sessions/{session_id}/components",
            get(sessions::list_components),
        )
        .route("/api/protected/chat", post(chat::send_message))
        .route("/api/protected/components", post(components::save_component));

    Router::new()
        .merge(pages)
        .merge(auth_routes)
        .merge(protected_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state)
}
