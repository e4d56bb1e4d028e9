//! Access guard for the protected API namespace and the playground UI.
//!
//! The guard is stateless: a token is valid when its signature and expiry
//! check out, with no database lookup. Revoking a token before it expires is
//! therefore not possible.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, warn};

use playground_types::api::Claims;

use crate::auth::{AUTH_COOKIE, removal_cookie, verify_token};
use crate::error::ApiError;
use crate::state::AppState;

pub const LOGIN_PATH: &str = "/login";

const PUBLIC_PATHS: &[&str] = &["/", "/login", "/signup"];
const API_PREFIX: &str = "/api/protected";
const UI_PREFIX: &str = "/playground";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardArea {
    /// Always open.
    Public,
    /// Protected JSON API; failures answer 401.
    Api,
    /// Protected pages; failures redirect to the login page.
    Ui,
    /// Not matched by the guard at all.
    Unguarded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenState {
    Missing,
    Invalid,
    Valid(Claims),
}

#[derive(Debug, Clone, PartialEq)]
pub enum GuardDecision {
    Proceed(Option<Claims>),
    Unauthorized,
    RedirectToLogin { clear_cookie: bool },
}

fn under(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

pub fn classify(path: &str) -> GuardArea {
    if PUBLIC_PATHS.contains(&path) {
        GuardArea::Public
    } else if under(path, API_PREFIX) {
        GuardArea::Api
    } else if under(path, UI_PREFIX) {
        GuardArea::Ui
    } else {
        GuardArea::Unguarded
    }
}

pub fn decide(area: GuardArea, token: TokenState) -> GuardDecision {
    match (area, token) {
        (GuardArea::Public | GuardArea::Unguarded, _) => GuardDecision::Proceed(None),
        (_, TokenState::Valid(claims)) => GuardDecision::Proceed(Some(claims)),
        (GuardArea::Api, _) => GuardDecision::Unauthorized,
        (GuardArea::Ui, TokenState::Missing) => GuardDecision::RedirectToLogin { clear_cookie: false },
        // Dropping the dead cookie stops the browser from looping on it.
        (GuardArea::Ui, TokenState::Invalid) => GuardDecision::RedirectToLogin { clear_cookie: true },
    }
}

pub fn token_state(jar: &CookieJar, secret: &str) -> TokenState {
    match jar.get(AUTH_COOKIE) {
        None => TokenState::Missing,
        Some(cookie) => match verify_token(secret, cookie.value()) {
            Some(claims) => TokenState::Valid(claims),
            None => TokenState::Invalid,
        },
    }
}

/// Extract and validate the identity cookie, then attach `Claims` to the
/// request for downstream handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_owned();
    let area = classify(&path);
    if matches!(area, GuardArea::Public | GuardArea::Unguarded) {
        return next.run(req).await;
    }

    match decide(area, token_state(&jar, &state.jwt_secret)) {
        GuardDecision::Proceed(claims) => {
            if let Some(claims) = claims {
                debug!("Authenticated user {} for {}", claims.sub, path);
                req.extensions_mut().insert(claims);
            }
            next.run(req).await
        }
        GuardDecision::Unauthorized => {
            warn!("Rejected unauthenticated API request to {}", path);
            ApiError::Unauthorized.into_response()
        }
        GuardDecision::RedirectToLogin { clear_cookie } => {
            warn!("Redirecting unauthenticated request for {} to login", path);
            let redirect = Redirect::temporary(LOGIN_PATH);
            if clear_cookie {
                (jar.remove(removal_cookie()), redirect).into_response()
            } else {
                redirect.into_response()
            }
        }
    }
}
