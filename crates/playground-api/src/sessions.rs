use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use playground_db::queries::DEFAULT_SESSION_TITLE;
use playground_types::api::{
    Claims, ComponentListResponse, CreateSessionRequest, SessionDetailResponse,
    SessionListResponse, SessionResponse, UpdateSessionRequest,
};
use playground_types::models::Session;

use crate::error::{ApiError, ApiJson};
use crate::state::{AppState, run_db};

/// Ownership check. A session that exists but belongs to someone else is
/// reported exactly like one that does not exist.
pub(crate) async fn owned_session(
    state: &AppState,
    session_id: i64,
    user_id: i64,
) -> Result<Session, ApiError> {
    run_db(state, move |db| db.get_session(session_id, user_id))
        .await?
        .ok_or_else(ApiError::session_not_found)
}

/// Path ids that do not parse cannot name a session the caller owns.
fn session_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse().map_err(|_| ApiError::session_not_found())
}

/// GET /api/protected/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let user_id = claims.sub;
    let sessions = run_db(&state, move |db| db.get_user_sessions(user_id)).await?;
    Ok(Json(SessionListResponse { sessions }))
}

/// POST /api/protected/sessions
pub async fn create_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION_TITLE.to_string());

    let user_id = claims.sub;
    let session = run_db(&state, move |db| db.create_session(user_id, &title)).await?;

    info!("User {} created session {}", user_id, session.id);
    Ok((StatusCode::CREATED, Json(SessionResponse { session })))
}

/// GET /api/protected/sessions/{session_id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<SessionDetailResponse>, ApiError> {
    let session_id = session_id(&raw_id)?;
    let user_id = claims.sub;

    let detail = run_db(&state, move |db| {
        let Some(session) = db.get_session(session_id, user_id)? else {
            return Ok(None);
        };
        let messages = db.get_chat_messages(session_id)?;
        let component = db.get_latest_component_version(session_id)?;
        Ok(Some(SessionDetailResponse {
            session,
            messages,
            component,
        }))
    })
    .await?
    .ok_or_else(ApiError::session_not_found)?;

    Ok(Json(detail))
}

/// PATCH /api/protected/sessions/{session_id}
pub async fn update_session(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<UpdateSessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session_id = session_id(&raw_id)?;
    let title = req
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Title is required".into()))?;

    let user_id = claims.sub;
    let session = run_db(&state, move |db| db.update_session_title(session_id, user_id, &title))
        .await?
        .ok_or_else(ApiError::session_not_found)?;

    Ok(Json(SessionResponse { session }))
}

/// GET /api/protected/sessions/{session_id}/components
pub async fn list_components(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ComponentListResponse>, ApiError> {
    let session_id = session_id(&raw_id)?;
    owned_session(&state, session_id, claims.sub).await?;

    let components = run_db(&state, move |db| db.get_component_versions(session_id)).await?;
    Ok(Json(ComponentListResponse { components }))
}
