//! Gemini API client (generateContent) and the AI-backed responder built on it.
//!
//! Not used unless `chat.responder` is "gemini". Conversation state comes from the
//! caller's session transcript; the client itself is stateless.

use crate::responder::{replies, Responder};
use crate::transcript::{Message, Speaker};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Client for the Gemini HTTP API.
#[derive(Clone)]
pub struct GeminiClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("gemini request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("gemini api error: {0}")]
    Api(String),
}

impl GeminiClient {
    pub fn new(base_url: Option<String>, api_key: Option<String>, model: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Self {
            base_url,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model,
            client: reqwest::Client::new(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// POST /models/{model}:generateContent — returns the first candidate's text (may be empty).
    pub async fn generate(
        &self,
        system_instruction: &str,
        contents: Vec<Content>,
    ) -> Result<String, GeminiError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GeminiError::Api("api key not configured".to_string()))?;
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateRequest {
            system_instruction: (!system_instruction.trim().is_empty())
                .then(|| Content::text(None, system_instruction)),
            contents,
        };
        let res = self
            .client
            .post(&url)
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(GeminiError::Api(format!("{} {}", status, body)));
        }
        let data: GenerateResponse = res.json().await?;
        Ok(data.text())
    }
}

/// One turn in Gemini's wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: String,
}

impl Content {
    pub fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

impl GenerateResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default()
    }
}

/// Gemini `contents` for a turn: the history after the greeting, then the new user text.
pub fn build_contents(history: &[Message], text: &str) -> Vec<Content> {
    let start = history
        .iter()
        .position(|m| m.speaker() == Speaker::User)
        .unwrap_or(history.len());
    history[start..]
        .iter()
        .map(|m| {
            let role = match m.speaker() {
                Speaker::User => "user",
                Speaker::Assistant => "model",
            };
            Content::text(Some(role), m.text())
        })
        .chain(std::iter::once(Content::text(Some("user"), text)))
        .collect()
}

/// AI-backed responder. Never fails: errors become fixed apology texts.
pub struct GeminiResponder {
    client: GeminiClient,
    system_instruction: String,
}

impl GeminiResponder {
    pub fn new(client: GeminiClient, system_instruction: impl Into<String>) -> Self {
        Self {
            client,
            system_instruction: system_instruction.into(),
        }
    }
}

#[async_trait]
impl Responder for GeminiResponder {
    async fn reply(&self, history: &[Message], text: &str) -> Message {
        if !self.client.has_api_key() {
            return Message::assistant(replies::AI_OFFLINE);
        }
        let contents = build_contents(history, text);
        match self.client.generate(&self.system_instruction, contents).await {
            Ok(reply) if !reply.trim().is_empty() => Message::assistant(reply),
            Ok(_) => Message::assistant(replies::AI_EMPTY),
            Err(e) => {
                log::error!("gemini: {}", e);
                Message::assistant(replies::AI_FAILED)
            }
        }
    }
}
