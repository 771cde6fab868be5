use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use compailer_api::config::Config;
use compailer_api::generate::{CompletionError, CompletionService};
use compailer_api::routes::{router, AppState, DOWNLOAD_FILE_NAME, PREVIEW_CSP, PREVIEW_KEY_HEADER};
use compailer_api::runtime::SNIPPET_START_MARKER;
use serde_json::{json, Value};
use tower::ServiceExt;

struct Canned(Result<&'static str, &'static str>);

#[async_trait]
impl CompletionService for Canned {
    async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
        self.0
            .map(str::to_string)
            .map_err(|e| CompletionError::Request(e.to_string()))
    }
}

fn app_with(service: Option<Canned>) -> Router {
    let completion = service.map(|s| Arc::new(s) as Arc<dyn CompletionService>);
    router(AppState::new(completion, &Config::default()))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Vec<u8>, HeaderMap) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec(), headers)
}

fn json_of(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn health_and_frameworks() {
    let app = app_with(None);

    let (status, body, _) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body), json!({"status": "ok"}));

    let (status, body, _) = send(&app, "GET", "/frameworks", None).await;
    assert_eq!(status, StatusCode::OK);
    let options = json_of(&body);
    assert_eq!(options.as_array().unwrap().len(), 6);
    assert_eq!(options[0], json!({"value": "html-css", "label": "HTML + CSS"}));
}

#[tokio::test]
async fn generate_extracts_code_and_seeds_preview() {
    let app = app_with(Some(Canned(Ok("Sure:\n```html\n<h1>Hi</h1>\n```"))));

    let (status, body, _) = send(
        &app,
        "POST",
        "/generate",
        Some(json!({"prompt": "a heading", "framework": "html-css", "session": "tab-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = json_of(&body);
    assert_eq!(body["code"], "<h1>Hi</h1>");
    assert_eq!(body["raw_text"], "Sure:\n```html\n<h1>Hi</h1>\n```");

    let (status, body, headers) = send(&app, "GET", "/preview/tab-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"<h1>Hi</h1>");
    assert_eq!(headers[PREVIEW_KEY_HEADER], "0");
    assert_eq!(headers[header::CONTENT_SECURITY_POLICY], PREVIEW_CSP);
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
}

#[tokio::test]
async fn generate_validation_and_failures() {
    let app = app_with(Some(Canned(Err("upstream exploded: key=abc"))));

    let (status, body, _) = send(&app, "POST", "/generate", Some(json!({"prompt": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_of(&body)["detail"], "Please describe your component first");

    let (status, body, _) = send(&app, "POST", "/generate", Some(json!({"prompt": "card"}))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(
        json_of(&body)["detail"],
        "Failed to generate code. Please try again."
    );

    let unconfigured = app_with(None);
    let (status, _, _) = send(&unconfigured, "POST", "/generate", Some(json!({"prompt": "card"}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn extract_endpoint_handles_missing_text() {
    let app = app_with(None);

    let (status, body, _) = send(&app, "POST", "/extract", Some(json!({"text": "```js\nlet a;\n```"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body)["code"], "let a;");

    let (_, body, _) = send(&app, "POST", "/extract", Some(json!({}))).await;
    assert_eq!(json_of(&body)["code"], "");
}

#[tokio::test]
async fn fix_images_annotates_injects_and_updates_session() {
    let app = app_with(None);
    let code = r#"<a href="https://x"><img src="y"></a>"#;

    let (status, body, _) = send(
        &app,
        "POST",
        "/fix-images",
        Some(json!({"code": code, "session": "s"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = json_of(&body);
    assert_eq!(body["fixed_count"], 1);
    assert_eq!(body["applied"], true);
    assert_eq!(body["degraded"], Value::Null);
    assert_eq!(body["message"], "Fixed 1 broken image");
    let html = body["html"].as_str().unwrap();
    assert!(html.contains(r#"data-disabled-href="https://x""#));
    assert!(!html.contains(" href="));
    assert_eq!(html.matches(SNIPPET_START_MARKER).count(), 1);

    let (_, preview, _) = send(&app, "GET", "/preview/s", None).await;
    assert_eq!(String::from_utf8(preview).unwrap(), html);
}

#[tokio::test]
async fn fix_images_without_images_is_not_applied() {
    let app = app_with(None);
    let (status, body, _) = send(&app, "POST", "/fix-images", Some(json!({"code": "<p>text</p>"}))).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_of(&body);
    assert_eq!(body["applied"], false);
    assert_eq!(body["fixed_count"], 0);
    assert_eq!(body["html"], "<p>text</p>");
    assert_eq!(body["message"], "No broken images found");

    let (status, body, _) = send(&app, "POST", "/fix-images", Some(json!({"code": " "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_of(&body)["detail"], "No code to fix images for");
}

#[tokio::test]
async fn refresh_bumps_preview_key() {
    let app = app_with(None);

    let (status, _, _) = send(&app, "POST", "/preview/nobody/refresh", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(&app, "POST", "/fix-images", Some(json!({"code": "<img>", "session": "r"}))).await;
    let (status, body, _) = send(&app, "POST", "/preview/r/refresh", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_of(&body)["refresh_key"], 1);

    let (_, _, headers) = send(&app, "GET", "/preview/r", None).await;
    assert_eq!(headers[PREVIEW_KEY_HEADER], "1");
}

#[tokio::test]
async fn download_returns_attachment() {
    let app = app_with(None);

    let (status, body, headers) = send(&app, "POST", "/download", Some(json!({"code": "<p>x</p>"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"<p>x</p>");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"{}\"", DOWNLOAD_FILE_NAME).as_str()
    );

    let (status, body, _) = send(&app, "POST", "/download", Some(json!({"code": ""}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_of(&body)["detail"], "No code to download");
}

#[tokio::test]
async fn preview_sessions_can_be_closed() {
    let app = app_with(None);
    send(&app, "POST", "/fix-images", Some(json!({"code": "<img>", "session": "gone"}))).await;

    let (status, _, _) = send(&app, "DELETE", "/preview/gone", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, _) = send(&app, "GET", "/preview/gone", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, _) = send(&app, "DELETE", "/preview/gone", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn preview_sessions_are_capped() {
    let config = Config {
        max_preview_sessions: 3,
        ..Config::default()
    };
    let app = router(AppState::new(None, &config));

    for i in 0..50 {
        let session = format!("s{i}");
        send(&app, "POST", "/fix-images", Some(json!({"code": "<img>", "session": session}))).await;
    }

    let (status, _, _) = send(&app, "GET", "/preview/s0", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    for i in 47..50 {
        let (status, _, _) = send(&app, "GET", &format!("/preview/s{i}"), None).await;
        assert_eq!(status, StatusCode::OK);
    }
}
