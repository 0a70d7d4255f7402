//! HTTP API and browser chat UI.
//!
//! ## Endpoints
//!
//! - `GET /` - Single-page chat UI
//! - `GET /api/health` - Health check
//! - `POST /api/threads` - Create a thread
//! - `GET /api/threads` - List threads
//! - `GET /api/threads/:id` - Thread messages
//! - `DELETE /api/threads/:id` - Delete a thread
//! - `POST /api/threads/:id/messages` - Send a message, streamed as SSE

mod chat;
pub mod types;

use std::sync::Arc;

use axum::{
    extract::State,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agent::Agent;
use crate::config::Config;
use types::HealthResponse;

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Shared application state.
pub struct AppState {
    pub agent: Arc<Agent>,
}

pub fn router(agent: Arc<Agent>) -> Router {
    let state = Arc::new(AppState { agent });

    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .route("/api/threads", post(chat::create_thread).get(chat::list_threads))
        .route(
            "/api/threads/:id",
            get(chat::get_thread).delete(chat::delete_thread),
        )
        .route("/api/threads/:id/messages", post(chat::send_message))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and run until Ctrl-C.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let agent = Arc::new(Agent::from_config(&config)?);
    let app = router(agent);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.agent.model().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::InMemoryCheckpointer;
    use crate::llm::{ChatMessage, ChatResponse, LlmClient, LlmError, ToolSchema};
    use crate::sandbox::Sandbox;
    use crate::tools::{Calculate, ToolRegistry};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    /// Always answers with the same text.
    struct EchoLlm;

    #[async_trait]
    impl LlmClient for EchoLlm {
        async fn chat_completion(
            &self,
            _model: &str,
            messages: &[ChatMessage],
            _tools: Option<&[ToolSchema]>,
        ) -> Result<ChatResponse, LlmError> {
            let last = messages.last().map(ChatMessage::text).unwrap_or_default();
            Ok(ChatResponse {
                content: Some(format!("You said: {}", last)),
                ..Default::default()
            })
        }
    }

    fn app() -> (tempfile::TempDir, Router) {
        let dir = tempfile::tempdir().unwrap();
        let agent = Agent::with_parts(
            Arc::new(EchoLlm),
            "echo".to_string(),
            ToolRegistry::from_tools(vec![Box::new(Calculate)]),
            Arc::new(InMemoryCheckpointer::new()),
            Sandbox::open(dir.path()).unwrap(),
            3,
        );
        (dir, router(Arc::new(agent)))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, String) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn serves_index_and_health() {
        let (_dir, app) = app();
        let (status, body) = send(&app, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<html"));

        let (status, body) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        let health: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["model"], "echo");
    }

    #[tokio::test]
    async fn thread_lifecycle_with_streamed_turn() {
        let (_dir, app) = app();

        let (status, body) = send(&app, "POST", "/api/threads", None).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = serde_json::from_str::<Value>(&body).unwrap()["id"]
            .as_str()
            .unwrap()
            .to_string();

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/threads/{}/messages", id),
            Some(json!({"content": "hello"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("event: step"));
        assert!(body.contains("event: done"));
        assert!(body.contains("You said: hello"));
        assert!(!body.contains("event: error"));

        let (_, body) = send(&app, "GET", &format!("/api/threads/{}", id), None).await;
        let thread: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(thread["messages"].as_array().unwrap().len(), 2);

        let (_, body) = send(&app, "GET", "/api/threads", None).await;
        let threads: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(threads[0]["title"], "hello");

        let (status, _) = send(&app, "DELETE", &format!("/api/threads/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "GET", &format!("/api/threads/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rejects_unknown_threads_and_empty_messages() {
        let (_dir, app) = app();
        let missing = uuid::Uuid::new_v4();
        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/threads/{}/messages", missing),
            Some(json!({"content": "hi"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = send(&app, "POST", "/api/threads", None).await;
        let id = serde_json::from_str::<Value>(&body).unwrap()["id"]
            .as_str()
            .unwrap()
            .to_string();
        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/threads/{}/messages", id),
            Some(json!({"content": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
