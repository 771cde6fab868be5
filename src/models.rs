use serde::{Deserialize, Serialize};

// ── Pipeline values ──────────────────────────────────────────────────────────

/// Raw text returned by the completion service for one generate action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub raw_text: String,
}

/// Markup after the annotation pass. `fixed_count` is the number of `<img>`
/// elements in the input tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotatedDocument {
    pub html: String,
    pub fixed_count: usize,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct FrameworkOption {
    pub value: &'static str,
    pub label: &'static str,
}

// ── Requests ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(default)]
    pub session: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub instructions: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct FixRequest {
    pub issue: String,
    pub code: String,
    #[serde(default)]
    pub session: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FixImagesRequest {
    pub code: String,
    #[serde(default)]
    pub session: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub code: String,
}

// ── Responses ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub code: String,
    pub raw_text: String,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub review: String,
}

#[derive(Debug, Serialize)]
pub struct CodeResponse {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct FixImagesResponse {
    pub html: String,
    pub fixed_count: usize,
    /// False when there was nothing to fix and the caller should keep its code.
    pub applied: bool,
    pub degraded: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub refresh_key: u64,
}
