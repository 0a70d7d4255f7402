//! Thread endpoints and the streaming chat turn.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use uuid::Uuid;

use super::types::{
    CreateThreadResponse, DoneEvent, ErrorEvent, SendMessageRequest, StepEvent, ThreadResponse,
};
use super::AppState;
use crate::agent::ThreadSummary;

type ApiResult<T> = Result<T, (StatusCode, String)>;

fn internal(e: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn not_found(id: Uuid) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("Thread {} not found", id))
}

/// `POST /api/threads`
pub async fn create_thread(
    State(state): State<Arc<AppState>>,
) -> ApiResult<(StatusCode, Json<CreateThreadResponse>)> {
    let id = state.agent.checkpointer().create().await.map_err(internal)?;
    tracing::info!(thread = %id, "Thread created");
    Ok((StatusCode::CREATED, Json(CreateThreadResponse { id })))
}

/// `GET /api/threads`
pub async fn list_threads(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<ThreadSummary>>> {
    let threads = state.agent.checkpointer().list_threads().await.map_err(internal)?;
    Ok(Json(threads))
}

/// `GET /api/threads/:id`
pub async fn get_thread(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ThreadResponse>> {
    let messages = state
        .agent
        .checkpointer()
        .load(id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(ThreadResponse { id, messages }))
}

/// `DELETE /api/threads/:id`
pub async fn delete_thread(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.agent.checkpointer().delete(id).await.map_err(internal)? {
        tracing::info!(thread = %id, "Thread deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(id))
    }
}

/// `POST /api/threads/:id/messages`: run a turn and stream its steps.
///
/// Events: `step` (messages added), then `done` with the final answer or
/// `error` with a message.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Message content is empty".to_string()));
    }
    if state.agent.checkpointer().load(id).await.map_err(internal)?.is_none() {
        return Err(not_found(id));
    }

    tracing::info!(thread = %id, chars = content.len(), "Chat turn started");
    let steps = Arc::clone(&state.agent).stream(id, content);

    let stream = async_stream::stream! {
        futures::pin_mut!(steps);
        let mut answer = None;
        while let Some(step) = steps.next().await {
            match step {
                Ok(step) => {
                    if let Some(text) = step.final_answer() {
                        answer = Some(text.to_string());
                    }
                    let payload = StepEvent {
                        messages: step.new_messages().to_vec(),
                        total: step.messages.len(),
                    };
                    match Event::default().event("step").json_data(&payload) {
                        Ok(ev) => yield Ok(ev),
                        Err(e) => tracing::error!("Failed to serialize SSE step event: {e}"),
                    }
                }
                Err(e) => {
                    tracing::warn!(thread = %id, error = %e, "Chat turn failed");
                    if let Ok(ev) = Event::default()
                        .event("error")
                        .json_data(ErrorEvent { message: e.to_string() })
                    {
                        yield Ok(ev);
                    }
                    return;
                }
            }
        }

        let payload = DoneEvent { answer: answer.unwrap_or_default() };
        if let Ok(ev) = Event::default().event("done").json_data(payload) {
            yield Ok(ev);
        }
        tracing::info!(thread = %id, "Chat turn finished");
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    ))
}
