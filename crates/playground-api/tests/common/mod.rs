#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, Response, header},
};
use futures_util::future::BoxFuture;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use playground_api::generation::{DeltaStream, GenerationError, Generator, PromptMessage};
use playground_api::{AppState, AppStateInner};
use playground_db::Database;

pub const SECRET: &str = "test-secret";

/// Replays a fixed list of deltas and records every prompt it was sent.
#[derive(Default)]
pub struct ScriptedGenerator {
    pub chunks: Vec<String>,
    pub fail: bool,
    /// Break the stream with an error after the scripted chunks.
    pub break_after: bool,
    /// Never finish after the scripted chunks.
    pub stall: bool,
    pub prompts: Mutex<Vec<Vec<PromptMessage>>>,
}

impl ScriptedGenerator {
    pub fn replying(chunks: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        })
    }

    pub fn breaking(chunks: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            break_after: true,
            ..Default::default()
        })
    }

    pub fn stalling(chunks: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            stall: true,
            ..Default::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }
}

impl Generator for ScriptedGenerator {
    fn stream(&self, messages: Vec<PromptMessage>) -> BoxFuture<'_, Result<DeltaStream, GenerationError>> {
        self.prompts.lock().unwrap().push(messages);
        let chunks = self.chunks.clone();
        let (fail, break_after, stall) = (self.fail, self.break_after, self.stall);
        Box::pin(async move {
            if fail {
                return Err(GenerationError::Upstream {
                    status: 503,
                    body: "overloaded".into(),
                });
            }
            let scripted = futures_util::stream::iter(chunks.into_iter().map(Ok));
            let stream: DeltaStream = if break_after {
                let broken = futures_util::stream::once(async {
                    Err(GenerationError::Transport("connection reset".into()))
                });
                Box::pin(futures_util::StreamExt::chain(scripted, broken))
            } else if stall {
                Box::pin(futures_util::StreamExt::chain(scripted, futures_util::stream::pending()))
            } else {
                Box::pin(scripted)
            };
            Ok(stream)
        })
    }
}

pub fn app_with(generator: Arc<dyn Generator>) -> (Router, AppState) {
    app_with_timeout(generator, Duration::from_secs(5))
}

pub fn app_with_timeout(generator: Arc<dyn Generator>, generation_timeout: Duration) -> (Router, AppState) {
    let state: AppState = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        jwt_secret: SECRET.into(),
        cookie_secure: false,
        generator,
        generation_timeout,
    });
    (playground_api::router(state.clone()), state)
}

pub fn app() -> (Router, AppState) {
    app_with(ScriptedGenerator::replying(&[]))
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::COOKIE, format!("auth-token={}", token));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn send(app: &Router, req: Request<Body>) -> Response<Body> {
    app.clone().oneshot(req).await.unwrap()
}

pub async fn body_bytes(resp: Response<Body>) -> Vec<u8> {
    resp.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(resp: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

pub fn set_cookie(resp: &Response<Body>) -> Option<String> {
    resp.headers()
        .get(header::SET_COOKIE)
        .map(|v| v.to_str().unwrap().to_string())
}

/// Token value from an `auth-token=...; Path=/; ...` header.
pub fn token_from(set_cookie: &str) -> String {
    set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.strip_prefix("auth-token="))
        .unwrap()
        .to_string()
}

/// Sign up and return the identity token.
pub async fn signup(app: &Router, email: &str) -> String {
    let resp = send(
        app,
        request(
            Method::POST,
            "/api/auth/signup",
            None,
            Some(serde_json::json!({ "email": email, "password": "secret123" })),
        ),
    )
    .await;
    assert_eq!(resp.status(), 201);
    token_from(&set_cookie(&resp).unwrap())
}

pub async fn create_session(app: &Router, token: &str) -> i64 {
    let resp = send(
        app,
        request(Method::POST, "/api/protected/sessions", Some(token), Some(serde_json::json!({}))),
    )
    .await;
    assert_eq!(resp.status(), 201);
    body_json(resp).await["session"]["id"].as_i64().unwrap()
}
