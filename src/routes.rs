use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::config::Config;
use crate::extract::extract_code;
use crate::generate::{self, CompletionService, GenerationError};
use crate::models::{
    CodeResponse, DownloadRequest, ExtractRequest, FixImagesRequest, FixImagesResponse, FixRequest,
    GenerateRequest, GenerateResponse, RefreshResponse, ReviewRequest, ReviewResponse,
};
use crate::preview::PreviewRegistry;
use crate::prompts::{self, messages, FRAMEWORK_OPTIONS};
use crate::remediate::{self, AnnotateOptions};
use crate::runtime::inject_runtime;

pub const DOWNLOAD_FILE_NAME: &str = "CompAIler-Generated-Code.html";
pub const PREVIEW_KEY_HEADER: &str = "x-preview-key";
/// Generated scripts run in an opaque origin, never alongside this API.
pub const PREVIEW_CSP: &str = "sandbox allow-scripts";

// ── State ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    completion: Option<Arc<dyn CompletionService>>,
    annotate: AnnotateOptions,
    previews: Arc<PreviewRegistry>,
}

impl AppState {
    pub fn new(completion: Option<Arc<dyn CompletionService>>, config: &Config) -> Self {
        Self {
            completion,
            annotate: config.annotate.clone(),
            previews: Arc::new(PreviewRegistry::with_capacity(config.max_preview_sessions)),
        }
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/frameworks", get(frameworks))
        .route("/generate", post(generate_endpoint))
        .route("/review", post(review_endpoint))
        .route("/fix", post(fix_endpoint))
        .route("/extract", post(extract_endpoint))
        .route("/fix-images", post(fix_images_endpoint))
        .route(
            "/preview/:session",
            get(preview_endpoint).delete(close_preview_endpoint),
        )
        .route("/preview/:session/refresh", post(refresh_endpoint))
        .route("/download", post(download_endpoint))
        .with_state(state)
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn frameworks() -> impl IntoResponse {
    Json(FRAMEWORK_OPTIONS)
}

async fn generate_endpoint(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Response {
    if req.prompt.trim().is_empty() {
        return generation_error(GenerationError::EmptyPrompt);
    }
    let Some(service) = state.completion.as_deref() else {
        return detail(StatusCode::SERVICE_UNAVAILABLE, messages::API_KEY_MISSING);
    };
    let framework = prompts::resolve_framework(req.framework.as_deref());

    match generate::request_generation(service, &req.prompt, framework.value).await {
        Ok(result) => {
            let code = extract_code(Some(&result.raw_text));
            if let Some(session) = req.session.as_deref() {
                state.previews.with_surface(session, |s| s.set_code(code.clone()));
            }
            let response = GenerateResponse {
                code,
                raw_text: result.raw_text,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => generation_error(e),
    }
}

async fn review_endpoint(
    State(state): State<AppState>,
    Json(req): Json<ReviewRequest>,
) -> Response {
    let Some(service) = state.completion.as_deref() else {
        return detail(StatusCode::SERVICE_UNAVAILABLE, messages::API_KEY_MISSING);
    };
    match generate::review_code(service, &req.instructions, &req.code).await {
        Ok(review) => (StatusCode::OK, Json(ReviewResponse { review })).into_response(),
        Err(e) => generation_error(e),
    }
}

async fn fix_endpoint(State(state): State<AppState>, Json(req): Json<FixRequest>) -> Response {
    let Some(service) = state.completion.as_deref() else {
        return detail(StatusCode::SERVICE_UNAVAILABLE, messages::API_KEY_MISSING);
    };
    match generate::fix_code(service, &req.issue, &req.code).await {
        Ok(code) => {
            if let Some(session) = req.session.as_deref() {
                state.previews.with_surface(session, |s| s.set_code(code.clone()));
            }
            (StatusCode::OK, Json(CodeResponse { code })).into_response()
        }
        Err(e) => generation_error(e),
    }
}

async fn extract_endpoint(Json(req): Json<ExtractRequest>) -> Response {
    let code = extract_code(req.text.as_deref());
    (StatusCode::OK, Json(CodeResponse { code })).into_response()
}

async fn fix_images_endpoint(
    State(state): State<AppState>,
    Json(req): Json<FixImagesRequest>,
) -> Response {
    if req.code.trim().is_empty() {
        return detail(StatusCode::BAD_REQUEST, messages::NO_CODE_FOR_IMAGES);
    }

    let ticket = req.session.as_deref().map(|session| {
        state.previews.with_surface(session, |s| {
            if s.code() != req.code {
                s.set_code(req.code.clone());
            }
            s.begin_fix()
        })
    });

    let annotation = remediate::annotate(&req.code, &state.annotate).await;
    let degraded = annotation.degrade_reason().map(|r| r.to_string());
    let document = annotation.into_document();

    if document.fixed_count == 0 {
        let response = FixImagesResponse {
            html: req.code,
            fixed_count: 0,
            applied: false,
            degraded,
            message: messages::NO_IMAGES_FOUND.to_string(),
        };
        return (StatusCode::OK, Json(response)).into_response();
    }

    let html = inject_runtime(&document.html);

    if let (Some(session), Some(ticket)) = (req.session.as_deref(), ticket) {
        let applied = state
            .previews
            .with_surface(session, |s| s.complete_fix(ticket, html.clone()));
        if let Err(stale) = applied {
            tracing::info!(session, reason = %stale, "discarding stale image fix");
            return detail(StatusCode::CONFLICT, messages::FIX_SUPERSEDED);
        }
    }

    tracing::info!(fixed_count = document.fixed_count, "fixed images");
    let response = FixImagesResponse {
        html,
        fixed_count: document.fixed_count,
        applied: true,
        degraded,
        message: messages::images_fixed(document.fixed_count),
    };
    (StatusCode::OK, Json(response)).into_response()
}

async fn preview_endpoint(
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> Response {
    match state.previews.snapshot(&session) {
        Some((code, mount_key)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
                (header::CONTENT_SECURITY_POLICY, PREVIEW_CSP.to_string()),
                (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
                (HeaderName::from_static(PREVIEW_KEY_HEADER), mount_key.to_string()),
            ],
            code,
        )
            .into_response(),
        None => detail(StatusCode::NOT_FOUND, messages::UNKNOWN_SESSION),
    }
}

async fn close_preview_endpoint(
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> Response {
    if state.previews.remove(&session) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        detail(StatusCode::NOT_FOUND, messages::UNKNOWN_SESSION)
    }
}

async fn refresh_endpoint(
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> Response {
    match state.previews.remount(&session) {
        Some(refresh_key) => (StatusCode::OK, Json(RefreshResponse { refresh_key })).into_response(),
        None => detail(StatusCode::NOT_FOUND, messages::UNKNOWN_SESSION),
    }
}

async fn download_endpoint(Json(req): Json<DownloadRequest>) -> Response {
    if req.code.trim().is_empty() {
        return detail(StatusCode::BAD_REQUEST, messages::NO_CODE_DOWNLOAD);
    }
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", DOWNLOAD_FILE_NAME),
            ),
        ],
        req.code,
    )
        .into_response()
}

// ── Error mapping ────────────────────────────────────────────────────────────

fn generation_error(e: GenerationError) -> Response {
    let status = match &e {
        GenerationError::EmptyPrompt | GenerationError::EmptyCode(_) => StatusCode::BAD_REQUEST,
        GenerationError::Service(_) => StatusCode::BAD_GATEWAY,
    };
    detail(status, e.to_string())
}

fn detail(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({"detail": message.into()}))).into_response()
}
