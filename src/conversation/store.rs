//! Conversation state store.
//!
//! Maps a thread id to an append-only message history. Each conversation
//! sits behind its own mutex: a chat turn takes that mutex for its whole
//! read-invoke-append cycle via [`ConversationStore::begin_turn`], so turns on
//! one thread are serialized while different threads proceed independently.
//!
//! State lives in memory for the life of the process. There is no eviction
//! and no capacity bound.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use crate::llm::Message;

/// An ordered, append-only message history.
#[derive(Debug, Default, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

type SharedConversation = Arc<Mutex<Conversation>>;

/// Thread id → conversation map, cheap to clone and share between handlers.
#[derive(Clone, Default)]
pub struct ConversationStore {
    threads: Arc<RwLock<HashMap<String, SharedConversation>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the conversation for `thread_id`, creating it if absent.
    async fn entry(&self, thread_id: &str) -> SharedConversation {
        if let Some(conversation) = self.threads.read().await.get(thread_id) {
            return conversation.clone();
        }

        let mut threads = self.threads.write().await;
        threads
            .entry(thread_id.to_string())
            .or_insert_with(|| {
                debug!(thread_id, "Creating conversation");
                Arc::new(Mutex::new(Conversation::default()))
            })
            .clone()
    }

    /// Append a message to the end of a conversation, creating it if absent.
    pub async fn append(&self, thread_id: &str, message: Message) {
        let conversation = self.entry(thread_id).await;
        conversation.lock().await.append(message);
    }

    /// The current ordered history of a conversation (empty if it does not exist).
    ///
    /// Waits for an in-flight turn on the same thread, so the result never
    /// shows half a turn.
    pub async fn snapshot(&self, thread_id: &str) -> Vec<Message> {
        let conversation = self.threads.read().await.get(thread_id).cloned();
        match conversation {
            Some(conversation) => conversation.lock().await.messages().to_vec(),
            None => Vec::new(),
        }
    }

    /// Take exclusive access to a conversation for one chat turn.
    pub async fn begin_turn(&self, thread_id: &str) -> TurnGuard {
        let conversation = self.entry(thread_id).await;
        TurnGuard {
            thread_id: thread_id.to_string(),
            guard: conversation.lock_owned().await,
        }
    }

    /// Number of conversations created so far.
    pub async fn conversation_count(&self) -> usize {
        self.threads.read().await.len()
    }
}

/// Exclusive access to one conversation, released on drop.
///
/// Owned so it can move into the task that drives a response stream.
pub struct TurnGuard {
    thread_id: String,
    guard: OwnedMutexGuard<Conversation>,
}

impl TurnGuard {
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn append(&mut self, message: Message) {
        self.guard.append(message);
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.guard.messages().to_vec()
    }

    pub fn len(&self) -> usize {
        self.guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard.is_empty()
    }
}
