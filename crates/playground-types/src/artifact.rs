use serde::{Deserialize, Serialize};

/// Structured payload the model is asked to produce for every turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPayload {
    pub jsx: String,
    #[serde(default)]
    pub css: String,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Deserialize)]
struct LooseArtifact {
    #[serde(default)]
    jsx: Option<String>,
    #[serde(default)]
    css: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
}

/// Best-effort extraction of an artifact from a full assistant reply.
///
/// Tries each `{` in turn and reads one JSON object from there, ignoring
/// whatever follows it, so fenced code blocks and prose on either side are
/// tolerated. Returns `None` for free-form replies or payloads without any
/// JSX; that is an ordinary outcome, not an error.
pub fn parse_artifact(reply: &str) -> Option<ArtifactPayload> {
    reply
        .match_indices('{')
        .find_map(|(start, _)| artifact_at(&reply[start..]))
}

fn artifact_at(text: &str) -> Option<ArtifactPayload> {
    let loose = serde_json::Deserializer::from_str(text)
        .into_iter::<LooseArtifact>()
        .next()?
        .ok()?;
    let jsx = loose.jsx.filter(|jsx| !jsx.trim().is_empty())?;

    Some(ArtifactPayload {
        jsx,
        css: loose.css.unwrap_or_default(),
        explanation: loose.explanation,
    })
}
