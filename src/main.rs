use std::sync::Arc;

use compailer_api::config::Config;
use compailer_api::generate::{CompletionService, GeminiClient};
use compailer_api::routes::{self, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    let completion: Option<Arc<dyn CompletionService>> = match GeminiClient::from_config(&config) {
        Ok(Some(client)) => {
            tracing::info!(endpoint = %client.endpoint(), "gemini client ready");
            Some(Arc::new(client))
        }
        Ok(None) => {
            tracing::warn!("GEMINI_API_KEY not set; generation endpoints will answer 503");
            None
        }
        Err(e) => {
            tracing::error!("failed to build gemini client: {}", e);
            std::process::exit(2);
        }
    };

    let app = routes::router(AppState::new(completion, &config));

    let listener = tokio::net::TcpListener::bind(config.bind).await.unwrap();
    tracing::info!("listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.unwrap();
}
