//! Generation proxy: prompt assembly and a streaming chat-completions client.

use std::pin::Pin;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt, future::BoxFuture};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use playground_types::models::{ChatMessage, ComponentVersion};

/// Chat turns forwarded to the model on every request.
pub const HISTORY_LIMIT: u32 = 10;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const TEMPERATURE: f32 = 0.7;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const SYSTEM_PROMPT: &str = "\
You are an expert React component generator. Generate clean, modern React components based on user requests.

Rules:
1. Always return valid JSX/TSX code
2. Use modern React patterns (functional components, hooks)
3. Include proper TypeScript types when applicable
4. Use Tailwind CSS for styling
5. Make components responsive and accessible
6. If modifying existing code, apply only the requested changes";

const OUTPUT_CONTRACT: &str = "\
Format your response as JSON with this structure:
{
  \"jsx\": \"// Your JSX/TSX code here\",
  \"css\": \"/* Your CSS code here (if needed) */\",
  \"explanation\": \"Brief explanation of what you created/changed\"
}";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("network error: {0}")]
    Transport(String),

    #[error("upstream http {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("malformed stream chunk: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Incremental text deltas, in arrival order.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

/// A text-generation backend that delivers its answer incrementally.
pub trait Generator: Send + Sync {
    fn stream(&self, messages: Vec<PromptMessage>) -> BoxFuture<'_, Result<DeltaStream, GenerationError>>;
}

/// System instruction plus the last `HISTORY_LIMIT` turns. The latest
/// component is inlined so the model can edit it instead of starting over.
pub fn build_prompt(history: &[ChatMessage], latest: Option<&ComponentVersion>) -> Vec<PromptMessage> {
    let context = match latest {
        Some(component) => format!(
            "JSX: {}\nCSS: {}",
            component.jsx_code.as_deref().unwrap_or_default(),
            component.css_code.as_deref().unwrap_or_default()
        ),
        None => "No existing component".to_string(),
    };
    let system = format!("{SYSTEM_PROMPT}\n\nCurrent component context:\n{context}\n\n{OUTPUT_CONTRACT}");

    let skip = history.len().saturating_sub(HISTORY_LIMIT as usize);
    std::iter::once(PromptMessage::new("system", system))
        .chain(
            history[skip..]
                .iter()
                .map(|msg| PromptMessage::new(msg.role.as_str(), msg.content.clone())),
        )
        .collect()
}

// -- OpenAI-compatible backend --

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Text delta carried by one SSE payload. `Ok(None)` for chunks with no
/// content (role announcements, finish markers).
pub fn chunk_delta(payload: &str) -> Result<Option<String>, GenerationError> {
    let chunk: CompletionChunk =
        serde_json::from_str(payload).map_err(|e| GenerationError::Decode(e.to_string()))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

/// Turns a raw completion event stream into text deltas. Ends at `[DONE]`
/// or at the first transport or decode error.
pub fn relay_events<S, B, E>(body: S) -> DeltaStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let mut events = Box::pin(body.eventsource());
    let stream = async_stream::stream! {
        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    yield Err(GenerationError::Transport(e.to_string()));
                    return;
                }
            };
            if event.data == "[DONE]" {
                return;
            }
            match chunk_delta(&event.data) {
                Ok(Some(delta)) => {
                    yield Ok(delta);
                }
                Ok(None) => {}
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
    };
    Box::pin(stream)
}

/// Streams chat completions from an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(api_key: String, base_url: String, model: String) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("playground/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    async fn open(&self, messages: Vec<PromptMessage>) -> Result<DeltaStream, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = CompletionRequest {
            model: &self.model,
            messages: &messages,
            temperature: TEMPERATURE,
            stream: true,
        };

        debug!(model = %self.model, turns = messages.len(), "opening completion stream");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(relay_events(response.bytes_stream()))
    }
}

impl Generator for OpenAiGenerator {
    fn stream(&self, messages: Vec<PromptMessage>) -> BoxFuture<'_, Result<DeltaStream, GenerationError>> {
        Box::pin(self.open(messages))
    }
}
