//! Wayfinder gateway: HTTP transport over the core orchestrator.
//! Chat, index refresh, synthesized audio files.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wayfinder_core::{Assistant, FinalResponse, GuideConfig, Providers};

const DEFAULT_USER: &str = "default-user";
const DEFAULT_CONVERSATION: &str = "default-convo";
const SWEEP_INTERVAL: Duration = Duration::from_secs(600);

struct AppState {
    assistant: Assistant,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    #[serde(default)]
    message: String,
    #[serde(default = "default_user")]
    user_id: String,
    #[serde(default = "default_conversation")]
    conversation_id: String,
}

fn default_user() -> String {
    DEFAULT_USER.to_string()
}

fn default_conversation() -> String {
    DEFAULT_CONVERSATION.to_string()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GuideConfig::load()?;
    let providers = Providers::from_config(&config);
    let corpus = Assistant::corpus_from_config(&config).await?;
    let assistant = Assistant::build(providers, corpus, &config);

    match assistant.index.refresh().await {
        Ok(n) => tracing::info!(entries = n, "corpus index ready"),
        Err(e) => tracing::warn!(error = %e, "initial index build failed; will reseed on first query"),
    }

    let audio_dir = config.audio_dir();
    tokio::fs::create_dir_all(&audio_dir).await?;

    let state = Arc::new(AppState { assistant });
    spawn_sweeper(Arc::clone(&state));

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/index/refresh", post(refresh_handler))
        .nest_service("/static", ServeDir::new(&audio_dir))
        .with_state(state)
        .layer(axum::middleware::from_fn(log_request))
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, audio_dir = %audio_dir.display(), "wayfinder gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_sweeper(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SWEEP_INTERVAL);
        tick.tick().await;
        loop {
            tick.tick().await;
            state.assistant.sweep();
        }
    });
}

async fn log_request(request: Request<Body>, next: Next) -> Response {
    tracing::debug!(method = %request.method(), path = %request.uri().path(), "request");
    next.run(request).await
}

async fn health() -> &'static str {
    "OK"
}

/// POST /api/chat: `{message, userId, conversationId}` → final response.
/// Failures of any kind come back as the fixed apology with status 200.
async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<FinalResponse>, (StatusCode, Json<serde_json::Value>)> {
    let message = body.message.trim().to_string();
    if message.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "message is required" })),
        ));
    }
    tracing::info!(user = %body.user_id, conversation = %body.conversation_id, "chat request");

    let response = Arc::clone(&state.assistant.orchestrator)
        .handle_guarded(message, Some(body.user_id), Some(body.conversation_id))
        .await;
    Ok(Json(response))
}

/// POST /api/index/refresh: rebuild the corpus index from its source.
async fn refresh_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.assistant.index.refresh().await {
        Ok(n) => (StatusCode::OK, Json(serde_json::json!({ "indexed": n }))),
        Err(e) => {
            tracing::error!(error = %e, "index refresh failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        }
    }
}
