//! Boundary to the text-completion service and the three requests built on
//! top of it: generate, review and fix.

use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

use crate::config::Config;
use crate::extract::extract_code;
use crate::models::GenerationResult;
use crate::prompts::{self, messages};

const USER_AGENT: &str = "compailer-api/1.0";

// ── Error types ──────────────────────────────────────────────────────────────

/// Raw failure from the completion service. Logged, never shown to users.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("{0}")]
    Request(String),
    #[error("completion service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion response had no text")]
    EmptyResponse,
}

/// What callers of [`request_generation`], [`review_code`] and [`fix_code`]
/// see. Display strings are the user-facing messages.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("{}", messages::NO_PROMPT)]
    EmptyPrompt,
    #[error("{0}")]
    EmptyCode(&'static str),
    #[error("{0}")]
    Service(&'static str),
}

// ── Completion boundary ──────────────────────────────────────────────────────

/// A single prompt-in, text-out completion call.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Gemini `generateContent` over HTTPS.
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl GeminiClient {
    pub fn new(
        base_url: &Url,
        model: &str,
        api_key: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, CompletionError> {
        let endpoint = base_url
            .join(&format!("v1beta/models/{}:generateContent", model))
            .map_err(|e| CompletionError::Request(format!("invalid endpoint: {}", e)))?;

        let client = reqwest::ClientBuilder::new()
            .connect_timeout(std::time::Duration::from_secs(5))
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CompletionError::Request(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
        })
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>, CompletionError> {
        match config.gemini_api_key.as_deref() {
            Some(key) => Self::new(
                &config.gemini_base_url,
                &config.gemini_model,
                key,
                config.request_timeout,
            )
            .map(Some),
            None => Ok(None),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionService for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Request(format!("TimeoutError: {}", e))
                } else if e.is_connect() {
                    CompletionError::Request(format!("ConnectError: {}", e))
                } else {
                    CompletionError::Request(format!("RequestError: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| CompletionError::Request(e.to_string()))?;
        candidate_text(&value).ok_or(CompletionError::EmptyResponse)
    }
}

/// Concatenated text parts of the first candidate.
fn candidate_text(value: &Value) -> Option<String> {
    let parts = value
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

// ── Requests ─────────────────────────────────────────────────────────────────

pub async fn request_generation(
    service: &dyn CompletionService,
    prompt: &str,
    framework: &str,
) -> Result<GenerationResult, GenerationError> {
    if prompt.trim().is_empty() {
        return Err(GenerationError::EmptyPrompt);
    }

    let instruction = prompts::system_prompt(prompt.trim(), framework);
    match service.complete(&instruction).await {
        Ok(raw_text) => {
            tracing::info!(framework, chars = raw_text.len(), "generation completed");
            Ok(GenerationResult { raw_text })
        }
        Err(e) => {
            tracing::error!(error = %e, "error generating code");
            Err(GenerationError::Service(messages::GENERATION_FAILED))
        }
    }
}

/// Free-form review of existing code.
pub async fn review_code(
    service: &dyn CompletionService,
    instructions: &str,
    code: &str,
) -> Result<String, GenerationError> {
    if code.trim().is_empty() {
        return Err(GenerationError::EmptyCode(messages::NO_CODE_FOR_REVIEW));
    }

    service
        .complete(&prompts::review_prompt(instructions, code))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "error reviewing code");
            GenerationError::Service(messages::REVIEW_FAILED)
        })
}

/// Ask for a corrected version of `code`; the reply goes through
/// [`extract_code`].
pub async fn fix_code(
    service: &dyn CompletionService,
    issue: &str,
    code: &str,
) -> Result<String, GenerationError> {
    if code.trim().is_empty() {
        return Err(GenerationError::EmptyCode(messages::NO_CODE_FOR_FIX));
    }

    let raw = service
        .complete(&prompts::fix_prompt(issue, code))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "error fixing code");
            GenerationError::Service(messages::FIX_FAILED)
        })?;
    Ok(extract_code(Some(&raw)))
}
