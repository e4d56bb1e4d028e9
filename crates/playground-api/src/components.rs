use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use playground_types::api::{Claims, ComponentResponse, SaveComponentRequest};

use crate::error::{ApiError, ApiJson};
use crate::sessions::owned_session;
use crate::state::{AppState, run_db};

/// POST /api/protected/components
///
/// Saves code the client already extracted from a finished turn as the
/// session's next version.
pub async fn save_component(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<SaveComponentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = req
        .session_id
        .ok_or_else(|| ApiError::BadRequest("sessionId is required".into()))?;

    owned_session(&state, session_id, claims.sub).await?;

    let (jsx_code, css_code) = (req.jsx_code, req.css_code);
    let component = run_db(&state, move |db| {
        db.save_component_version(session_id, jsx_code.as_deref(), css_code.as_deref())
    })
    .await?;

    Ok((StatusCode::CREATED, Json(ComponentResponse { component })))
}
