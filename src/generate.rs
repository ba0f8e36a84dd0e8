//! Generated answers for open-ended questions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::discover::{ControlId, FieldDescriptor};
use crate::profile::ProfileRecord;

const SYSTEM_INSTRUCTION: &str = "You are a professional assistant helping a candidate fill in \
    application forms. Answer concisely and professionally, using only the candidate's profile.";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
    #[error("generation returned no text")]
    EmptyResponse,
    #[error("API key not set in ${0}")]
    MissingApiKey(String),
}

impl GenerationError {
    /// Whether a second attempt could succeed. Missing credentials and
    /// client errors other than rate limiting will fail the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationError::Http(_) | GenerationError::Timeout(_) | GenerationError::EmptyResponse => true,
            GenerationError::Server { status, .. } => *status == 429 || *status >= 500,
            GenerationError::MissingApiKey(_) => false,
        }
    }
}

/// The text-generation backend.
#[async_trait]
pub trait Generator: Send + Sync {
    /// `max_length` bounds the response size in tokens; `creativity` is the
    /// sampling temperature.
    async fn generate(
        &self,
        prompt: &str,
        max_length: u32,
        creativity: f32,
    ) -> Result<String, GenerationError>;
}

/// Per-run generation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub max_length: u32,
    pub creativity: f32,
    pub timeout: Duration,
    pub retry_backoff: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_length: 500,
            creativity: 0.7,
            timeout: Duration::from_secs(30),
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// Prompt combining the profile summary with the question.
pub fn build_prompt(question: &str, profile: &ProfileRecord) -> String {
    let summary = profile.compact_summary();
    let summary = if summary.is_empty() {
        "(no profile details available)".to_string()
    } else {
        summary
    };
    format!(
        "Candidate profile:\n{summary}\n\n\
         Question:\n{question}\n\n\
         Write the answer the candidate would type into the form field. \
         Be specific, draw on the profile where relevant, keep a confident tone \
         and do not invent facts that are not in the profile. \
         Reply with the answer text only."
    )
}

/// Asks the generator at most once per control per run (plus one retry) and
/// remembers the outcome, failures included.
pub struct AnswerBridge {
    generator: Arc<dyn Generator>,
    settings: GenerationSettings,
    answers: HashMap<ControlId, Option<String>>,
}

impl AnswerBridge {
    pub fn new(generator: Arc<dyn Generator>, settings: GenerationSettings) -> Self {
        Self {
            generator,
            settings,
            answers: HashMap::new(),
        }
    }

    /// The generated answer for `descriptor`, or `None` if generation failed.
    pub async fn get_answer(
        &mut self,
        descriptor: &FieldDescriptor,
        question: &str,
        profile: &ProfileRecord,
    ) -> Option<String> {
        if let Some(cached) = self.answers.get(&descriptor.id) {
            return cached.clone();
        }

        let prompt = build_prompt(question, profile);
        let answer = match self.generate_with_retry(&prompt).await {
            Ok(text) => {
                info!(control = %descriptor.id, chars = text.len(), "generated answer");
                Some(text)
            }
            Err(e) => {
                warn!(control = %descriptor.id, question, error = %e, "no generated answer available");
                None
            }
        };
        self.answers.insert(descriptor.id.clone(), answer.clone());
        answer
    }

    async fn generate_with_retry(&self, prompt: &str) -> Result<String, GenerationError> {
        match self.attempt(prompt).await {
            Ok(text) => Ok(text),
            Err(first) if !first.is_transient() => Err(first),
            Err(first) => {
                warn!(error = %first, backoff = ?self.settings.retry_backoff, "generation failed; retrying once");
                tokio::time::sleep(self.settings.retry_backoff).await;
                self.attempt(prompt).await
            }
        }
    }

    async fn attempt(&self, prompt: &str) -> Result<String, GenerationError> {
        let call = self
            .generator
            .generate(prompt, self.settings.max_length, self.settings.creativity);
        let text = tokio::time::timeout(self.settings.timeout, call)
            .await
            .map_err(|_| GenerationError::Timeout(self.settings.timeout))??;
        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text.to_string())
    }
}

// ── OpenAI-compatible backend ───────────────────────────────────────

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// `POST {base_url}/chat/completions` client.
pub struct ChatCompletionsGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl ChatCompletionsGenerator {
    /// `base_url` should be like `https://api.openai.com/v1` (no trailing slash needed).
    pub fn new(base_url: &str, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    /// Build a client whose API key comes from the environment variable `key_env`.
    pub fn from_env(base_url: &str, model: impl Into<String>, key_env: &str) -> Result<Self, GenerationError> {
        let api_key = std::env::var(key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GenerationError::MissingApiKey(key_env.to_string()))?;
        Ok(Self::new(base_url, model, api_key))
    }

    fn request_body<'a>(&'a self, prompt: &'a str, max_length: u32, creativity: f32) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_INSTRUCTION,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: max_length,
            temperature: creativity,
        }
    }
}

fn first_choice_text(response: ChatResponse) -> Result<String, GenerationError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or(GenerationError::EmptyResponse)
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    async fn generate(
        &self,
        prompt: &str,
        max_length: u32,
        creativity: f32,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt, max_length, creativity))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Server {
                status: status.as_u16(),
                body,
            });
        }
        let response: ChatResponse = resp.json().await?;
        first_choice_text(response)
    }
}

/// Stand-in when no backend could be configured. Every open prompt is
/// skipped while profile-bound fields still fill.
pub struct UnavailableGenerator {
    key_env: String,
}

impl UnavailableGenerator {
    pub fn new(key_env: impl Into<String>) -> Self {
        Self {
            key_env: key_env.into(),
        }
    }
}

#[async_trait]
impl Generator for UnavailableGenerator {
    async fn generate(&self, _: &str, _: u32, _: f32) -> Result<String, GenerationError> {
        Err(GenerationError::MissingApiKey(self.key_env.clone()))
    }
}
