use std::io;

use axum::{
    Extension,
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::StreamExt;
use tracing::{error, info, warn};

use playground_types::api::{ChatRequest, Claims};
use playground_types::artifact::parse_artifact;
use playground_types::models::{ChatRole, ComponentVersion};

use crate::error::{ApiError, ApiJson};
use crate::generation::{HISTORY_LIMIT, build_prompt};
use crate::sessions::owned_session;
use crate::state::{AppState, run_db};

/// POST /api/protected/chat
///
/// Persists the user's turn, then relays the model's reply as a plain-text
/// stream. Once the reply is complete it is stored as an assistant message
/// and, if it carries a structured payload with code, as the session's next
/// component version. A client that disconnects drops the body, which stops
/// upstream consumption; nothing from an unfinished reply is stored.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<ChatRequest>,
) -> Result<Response, ApiError> {
    let session_id = req
        .session_id
        .ok_or_else(|| ApiError::BadRequest("sessionId is required".into()))?;
    let message = req
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("message is required".into()))?;

    owned_session(&state, session_id, claims.sub).await?;

    let (history, latest) = run_db(&state, move |db| {
        db.add_chat_message(session_id, ChatRole::User, &message)?;
        let history = db.get_recent_chat_messages(session_id, HISTORY_LIMIT)?;
        let latest = db.get_latest_component_version(session_id)?;
        Ok((history, latest))
    })
    .await?;

    let prompt = build_prompt(&history, latest.as_ref());
    let mut upstream = state
        .generator
        .stream(prompt)
        .await
        .map_err(|e| ApiError::Internal(anyhow::Error::new(e).context("generation request failed")))?;

    let deadline = tokio::time::Instant::now() + state.generation_timeout;
    let stream = async_stream::stream! {
        let mut reply = String::new();
        loop {
            match tokio::time::timeout_at(deadline, upstream.next()).await {
                Ok(Some(Ok(delta))) => {
                    reply.push_str(&delta);
                    yield Ok::<Bytes, io::Error>(Bytes::from(delta));
                }
                Ok(Some(Err(e))) => {
                    error!("Generation stream for session {} failed: {}", session_id, e);
                    yield Err(io::Error::other(e));
                    return;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!("Generation for session {} hit the time limit", session_id);
                    yield Err(io::Error::new(io::ErrorKind::TimedOut, "generation timed out"));
                    return;
                }
            }
        }

        match store_reply(&state, session_id, reply).await {
            Ok(Some(component)) => {
                info!("Session {} reply produced component version {}", session_id, component.version);
            }
            Ok(None) => {}
            Err(e) => {
                error!("Failed to store reply for session {}: {}", session_id, e);
                yield Err(io::Error::other("failed to store reply"));
            }
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// Stores a finished reply. Returns the new version when the reply parsed
/// into an artifact; free-form replies are kept as plain messages.
async fn store_reply(
    state: &AppState,
    session_id: i64,
    reply: String,
) -> Result<Option<ComponentVersion>, ApiError> {
    run_db(state, move |db| {
        db.add_chat_message(session_id, ChatRole::Assistant, &reply)?;

        let Some(artifact) = parse_artifact(&reply) else {
            return Ok(None);
        };
        let component = db.save_component_version(
            session_id,
            Some(artifact.jsx.as_str()),
            Some(artifact.css.as_str()),
        )?;
        Ok(Some(component))
    })
    .await
}
