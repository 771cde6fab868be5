use std::net::SocketAddr;
use std::time::Duration;

use url::Url;

use crate::preview::DEFAULT_MAX_SESSIONS;
use crate::remediate::{AnnotateOptions, DEFAULT_MAX_INPUT_BYTES};

// ── Constants ────────────────────────────────────────────────────────────────

const DEFAULT_BIND: &str = "0.0.0.0:8000";
const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is not a valid socket address: {value}")]
    InvalidBind { var: &'static str, value: String },
    #[error("{var} is not a valid URL: {value}")]
    InvalidUrl { var: &'static str, value: String },
    #[error("{var} must be a positive integer, got {value}")]
    InvalidNumber { var: &'static str, value: String },
}

// ── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: Url,
    pub request_timeout: Duration,
    pub annotate: AnnotateOptions,
    pub max_preview_sessions: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            gemini_api_key: None,
            gemini_model: DEFAULT_MODEL.to_string(),
            gemini_base_url: Url::parse(DEFAULT_GEMINI_BASE_URL).unwrap(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            annotate: AnnotateOptions::default(),
            max_preview_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; unset or blank keys use defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_raw = get("COMPAILER_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind_raw.parse().map_err(|_| ConfigError::InvalidBind {
            var: "COMPAILER_BIND",
            value: bind_raw.clone(),
        })?;

        let base_raw =
            get("COMPAILER_GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string());
        let gemini_base_url = Url::parse(&base_raw)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| ConfigError::InvalidUrl {
                var: "COMPAILER_GEMINI_BASE_URL",
                value: base_raw.clone(),
            })?;

        let timeout_secs = parse_positive(
            "COMPAILER_REQUEST_TIMEOUT_SECS",
            get("COMPAILER_REQUEST_TIMEOUT_SECS"),
            DEFAULT_REQUEST_TIMEOUT_SECS as usize,
        )?;
        let max_input_bytes = parse_positive(
            "COMPAILER_MAX_HTML_BYTES",
            get("COMPAILER_MAX_HTML_BYTES"),
            DEFAULT_MAX_INPUT_BYTES,
        )?;
        let max_preview_sessions = parse_positive(
            "COMPAILER_MAX_PREVIEW_SESSIONS",
            get("COMPAILER_MAX_PREVIEW_SESSIONS"),
            DEFAULT_MAX_SESSIONS,
        )?;
        let dom_parsing = get("COMPAILER_DOM_PARSING").as_deref() != Some("0");

        Ok(Self {
            bind,
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: get("COMPAILER_GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            gemini_base_url,
            request_timeout: Duration::from_secs(timeout_secs as u64),
            annotate: AnnotateOptions {
                dom_parsing,
                max_input_bytes,
            },
            max_preview_sessions,
        })
    }
}

fn parse_positive(
    var: &'static str,
    raw: Option<String>,
    default: usize,
) -> Result<usize, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => match value.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::InvalidNumber { var, value }),
        },
    }
}
