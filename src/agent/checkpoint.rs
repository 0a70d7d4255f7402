//! Conversation state kept between turns.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::llm::{ChatMessage, Role};

const TITLE_CHARS: usize = 60;

/// Listing entry for a conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadSummary {
    pub id: Uuid,
    pub title: Option<String>,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Storage for per-thread message histories.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Register an empty thread and return its id.
    async fn create(&self) -> Result<Uuid, String>;

    /// Messages of a thread, `None` if it was never saved.
    async fn load(&self, thread_id: Uuid) -> Result<Option<Vec<ChatMessage>>, String>;

    /// Replace a thread's history, creating the thread if needed.
    async fn save(&self, thread_id: Uuid, messages: &[ChatMessage]) -> Result<(), String>;

    /// All threads, most recently updated first.
    async fn list_threads(&self) -> Result<Vec<ThreadSummary>, String>;

    /// Returns whether the thread existed.
    async fn delete(&self, thread_id: Uuid) -> Result<bool, String>;
}

struct Thread {
    messages: Vec<ChatMessage>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Thread {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn summary(&self, id: Uuid) -> ThreadSummary {
        ThreadSummary {
            id,
            title: title_of(&self.messages),
            message_count: self.messages.len(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// First user message, cut to a short single line.
fn title_of(messages: &[ChatMessage]) -> Option<String> {
    let first = messages.iter().find(|m| m.role == Role::User)?;
    let line = first.text().lines().find(|l| !l.trim().is_empty())?.trim();
    let mut title: String = line.chars().take(TITLE_CHARS).collect();
    if line.chars().count() > TITLE_CHARS {
        title.push('…');
    }
    Some(title)
}

/// In-memory checkpointer (non-persistent).
#[derive(Clone, Default)]
pub struct InMemoryCheckpointer {
    threads: Arc<RwLock<HashMap<Uuid, Thread>>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn create(&self) -> Result<Uuid, String> {
        let id = Uuid::new_v4();
        self.threads.write().await.insert(id, Thread::new());
        Ok(id)
    }

    async fn load(&self, thread_id: Uuid) -> Result<Option<Vec<ChatMessage>>, String> {
        Ok(self
            .threads
            .read()
            .await
            .get(&thread_id)
            .map(|t| t.messages.clone()))
    }

    async fn save(&self, thread_id: Uuid, messages: &[ChatMessage]) -> Result<(), String> {
        let mut threads = self.threads.write().await;
        let thread = threads.entry(thread_id).or_insert_with(Thread::new);
        thread.messages = messages.to_vec();
        thread.updated_at = Utc::now();
        Ok(())
    }

    async fn list_threads(&self) -> Result<Vec<ThreadSummary>, String> {
        let mut summaries: Vec<ThreadSummary> = self
            .threads
            .read()
            .await
            .iter()
            .map(|(id, t)| t.summary(*id))
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn delete(&self, thread_id: Uuid) -> Result<bool, String> {
        Ok(self.threads.write().await.remove(&thread_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_load_and_delete() {
        let store = InMemoryCheckpointer::new();
        let id = Uuid::new_v4();
        assert_eq!(store.load(id).await.unwrap(), None);

        let messages = vec![ChatMessage::user("hello"), ChatMessage::assistant(Some("hi".into()), None)];
        store.save(id, &messages).await.unwrap();
        assert_eq!(store.load(id).await.unwrap(), Some(messages));

        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert_eq!(store.load(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_orders_by_update_and_titles_from_first_user_message() {
        let store = InMemoryCheckpointer::new();
        let older = store.create().await.unwrap();
        let newer = store.create().await.unwrap();
        store
            .save(newer, &[ChatMessage::user("\n  What is Rust?\nmore")])
            .await
            .unwrap();

        let threads = store.list_threads().await.unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].id, newer);
        assert_eq!(threads[0].title.as_deref(), Some("What is Rust?"));
        assert_eq!(threads[0].message_count, 1);
        assert_eq!(threads[1].id, older);
        assert_eq!(threads[1].title, None);
    }

    #[test]
    fn long_titles_are_cut() {
        let title = title_of(&[ChatMessage::user("a".repeat(100))]).unwrap();
        assert_eq!(title.chars().count(), TITLE_CHARS + 1);
        assert!(title.ends_with('…'));
    }
}
