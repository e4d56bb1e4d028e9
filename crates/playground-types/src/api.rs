use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, ComponentVersion, Session};

// -- Identity --

/// Claims carried in the identity token. Shared by the credential store
/// (issuing) and the access guard (verifying).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub iat: usize,
    pub exp: usize,
}

/// The identity a handler acts on behalf of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
}

impl From<&Claims> for AuthUser {
    fn from(claims: &Claims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email.clone(),
            name: claims.name.clone(),
        }
    }
}

// -- Auth --

// Fields are optional so that a missing field is a 400 from the handler,
// not a deserialization rejection.
#[derive(Debug, Default, Deserialize)]
pub struct SignupRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub message: String,
    pub user: AuthUser,
}

// -- Sessions --

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSessionRequest {
    pub title: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session: Session,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<Session>,
}

/// Everything the playground needs to resume a session.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionDetailResponse {
    pub session: Session,
    pub messages: Vec<ChatMessage>,
    pub component: Option<ComponentVersion>,
}

// -- Chat --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub session_id: Option<i64>,
    pub message: Option<String>,
}

// -- Components --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveComponentRequest {
    pub session_id: Option<i64>,
    pub jsx_code: Option<String>,
    pub css_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentResponse {
    pub component: ComponentVersion,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentListResponse {
    pub components: Vec<ComponentVersion>,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
