//! API request and response types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::ChatMessage;

/// `GET /api/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model: String,
}

/// Response after creating a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateThreadResponse {
    pub id: Uuid,
}

/// A thread and its saved messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadResponse {
    pub id: Uuid,
    pub messages: Vec<ChatMessage>,
}

/// Request to send a user message to a thread.
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    /// The user's message text
    pub content: String,
}

/// Payload of the `step` SSE event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepEvent {
    /// Messages added by this step
    pub messages: Vec<ChatMessage>,

    /// Total messages in the thread after this step
    pub total: usize,
}

/// Payload of the `done` SSE event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoneEvent {
    pub answer: String,
}

/// Payload of the `error` SSE event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub message: String,
}
