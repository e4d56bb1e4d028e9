use std::sync::OnceLock;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::info;

use playground_db::Database;
use playground_types::api::{AuthResponse, AuthUser, Claims, LoginRequest, SignupRequest};

use crate::error::{ApiError, ApiJson};
use crate::state::{AppState, run_db};

/// Cookie carrying the identity token.
pub const AUTH_COOKIE: &str = "auth-token";

/// Token lifetime and cookie max-age.
pub const TOKEN_TTL_DAYS: i64 = 7;

// -- Credential store --

/// Hash a password with Argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

/// `false` on mismatch and on a stored hash that does not parse.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn issue_token(secret: &str, user: &AuthUser) -> anyhow::Result<String> {
    issue_token_with_ttl(secret, user, chrono::Duration::days(TOKEN_TTL_DAYS))
}

fn issue_token_with_ttl(secret: &str, user: &AuthUser, ttl: chrono::Duration) -> anyhow::Result<String> {
    let now = chrono::Utc::now();
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        name: user.name.clone(),
        iat: now.timestamp() as usize,
        exp: (now + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Signature and expiry check. Every failure collapses to `None`.
pub fn verify_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .ok()
}

/// Stand-in hash verified against when no user matches, so a miss takes as
/// long as a wrong password.
fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| hash_password("playground-dummy-password").unwrap_or_default())
}

/// Look the user up by email and check the password.
pub fn authenticate_user(
    db: &Database,
    email: &str,
    password: &str,
) -> playground_db::Result<Option<AuthUser>> {
    let Some(user) = db.get_user_by_email(email)? else {
        // Unknown emails still pay for one verification.
        verify_password(password, dummy_hash());
        return Ok(None);
    };
    if !verify_password(password, &user.password_hash) {
        return Ok(None);
    }
    Ok(Some(AuthUser {
        id: user.id,
        email: user.email,
        name: user.name,
    }))
}

// -- Identity cookie --

pub fn auth_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::days(TOKEN_TTL_DAYS))
        .build()
}

pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, "")).path("/").build()
}

// -- Handlers --

fn required(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.trim().is_empty())
}

/// POST /api/auth/signup
pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(req): ApiJson<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(email), Some(password)) = (required(req.email), required(req.password)) else {
        return Err(ApiError::BadRequest("Email and password are required".into()));
    };
    let name = required(req.name);

    let lookup = email.clone();
    if run_db(&state, move |db| db.get_user_by_email(&lookup)).await?.is_some() {
        return Err(ApiError::Conflict("User already exists with this email".into()));
    }

    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {}", e)))??;

    // A concurrent signup can still win the unique index between lookup and insert.
    let insert_name = name.clone();
    let user = run_db(&state, move |db| {
        db.create_user(&email, &password_hash, insert_name.as_deref())
    })
    .await
    .map_err(|e| match e {
        ApiError::Conflict(_) => ApiError::Conflict("User already exists with this email".into()),
        other => other,
    })?;

    let auth_user = AuthUser {
        id: user.id,
        email: user.email,
        name,
    };
    let token = issue_token(&state.jwt_secret, &auth_user)?;

    info!("User {} signed up ({})", auth_user.id, auth_user.email);

    Ok((
        StatusCode::CREATED,
        jar.add(auth_cookie(token, state.cookie_secure)),
        Json(AuthResponse {
            message: "Account created successfully".into(),
            user: auth_user,
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(email), Some(password)) = (required(req.email), required(req.password)) else {
        return Err(ApiError::BadRequest("Email and password are required".into()));
    };

    let user = run_db(&state, move |db| authenticate_user(db, &email, &password))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let token = issue_token(&state.jwt_secret, &user)?;

    Ok((
        jar.add(auth_cookie(token, state.cookie_secure)),
        Json(AuthResponse {
            message: "Logged in".into(),
            user,
        }),
    ))
}

/// POST /api/auth/logout
pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    (
        jar.remove(removal_cookie()),
        Json(serde_json::json!({ "message": "Logged out" })),
    )
}

/// GET /api/auth/me
///
/// The token names the user; the answer comes from the stored row, so a
/// deleted account reads as signed out.
pub async fn me(State(state): State<AppState>, jar: CookieJar) -> Result<Json<AuthUser>, ApiError> {
    let claims = jar
        .get(AUTH_COOKIE)
        .and_then(|cookie| verify_token(&state.jwt_secret, cookie.value()))
        .ok_or(ApiError::Unauthorized)?;

    let user_id = claims.sub;
    let user = run_db(&state, move |db| db.get_user_by_id(user_id))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    Ok(Json(AuthUser {
        id: user.id,
        email: user.email,
        name: user.name,
    }))
}
