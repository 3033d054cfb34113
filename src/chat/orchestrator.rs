//! Chat orchestrator: one user query in, a stream of response fragments out.
//!
//! A turn:
//! 1. Takes exclusive access to the conversation and appends the user message
//! 2. Sends the full history to the selected model client
//! 3. Waits for the first non-empty fragment, so early failures surface as errors
//! 4. Hands the rest of the stream to a task that forwards fragments over a channel
//! 5. Appends the accumulated assistant message when the stream stops

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::conversation::{ConversationStore, TurnGuard};
use crate::error::ChatError;
use crate::llm::{FragmentStream, Message, ModelRegistry};

/// Channel depth between the upstream reader and the HTTP body.
const EVENT_BUFFER: usize = 32;

/// Something that happened on a response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A non-empty piece of response text.
    Fragment(String),
    /// The model finished normally.
    Done,
    /// The model failed after at least one fragment was produced.
    Error(String),
}

/// A started response.
#[derive(Debug)]
pub struct Reply {
    pub thread_id: String,
    pub events: mpsc::Receiver<ChatEvent>,
}

/// How a response stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Failed,
    Cancelled,
}

/// Runs chat turns against one provider.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<ModelRegistry>,
    store: ConversationStore,
    provider: String,
}

impl Orchestrator {
    pub fn new(registry: Arc<ModelRegistry>, store: ConversationStore, provider: impl Into<String>) -> Self {
        Self {
            registry,
            store,
            provider: provider.into(),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Start a turn on `thread_id` with the user's text.
    ///
    /// Returns once the first fragment is available (or the model finished
    /// without producing any). Failures up to that point are returned as
    /// errors; later failures arrive as [`ChatEvent::Error`].
    ///
    /// The conversation stays locked until the returned stream has finished
    /// or its receiver is dropped.
    pub async fn respond(&self, thread_id: &str, user_text: String) -> Result<Reply, ChatError> {
        let mut turn = self.store.begin_turn(thread_id).await;
        turn.append(Message::user(user_text));
        let history = turn.snapshot();

        let client = self.registry.get(&self.provider)?;
        debug!(
            thread_id,
            provider = %self.provider,
            model = client.model(),
            history = history.len(),
            "Invoking model"
        );

        let mut upstream = client.stream(history).await?;
        let first = loop {
            match upstream.next().await {
                Some(Ok(fragment)) if fragment.is_empty() => continue,
                Some(Ok(fragment)) => break Some(fragment),
                Some(Err(e)) => {
                    warn!(thread_id, error = %e, "Model failed before first fragment");
                    return Err(e.into());
                }
                None => break None,
            }
        };

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(forward(turn, upstream, first, tx));

        Ok(Reply {
            thread_id: thread_id.to_string(),
            events: rx,
        })
    }
}

/// Pump fragments from the model to the channel, then record the assistant message.
async fn forward(
    mut turn: TurnGuard,
    mut upstream: FragmentStream,
    first: Option<String>,
    tx: mpsc::Sender<ChatEvent>,
) {
    let mut accumulated = String::new();
    let mut fragments = 0usize;

    let outcome = pump(&mut upstream, first, &tx, &mut accumulated, &mut fragments).await;

    // Stop the upstream request before releasing the conversation.
    drop(upstream);

    info!(
        thread_id = turn.thread_id(),
        fragments,
        chars = accumulated.len(),
        outcome = ?outcome,
        "Response stream finished"
    );

    turn.append(Message::assistant(accumulated));
}

async fn pump(
    upstream: &mut FragmentStream,
    first: Option<String>,
    tx: &mpsc::Sender<ChatEvent>,
    accumulated: &mut String,
    fragments: &mut usize,
) -> Outcome {
    if let Some(fragment) = first {
        accumulated.push_str(&fragment);
        *fragments += 1;
        if tx.send(ChatEvent::Fragment(fragment)).await.is_err() {
            return Outcome::Cancelled;
        }
    }

    loop {
        let next = tokio::select! {
            _ = tx.closed() => return Outcome::Cancelled,
            next = upstream.next() => next,
        };

        match next {
            Some(Ok(fragment)) if fragment.is_empty() => continue,
            Some(Ok(fragment)) => {
                accumulated.push_str(&fragment);
                *fragments += 1;
                if tx.send(ChatEvent::Fragment(fragment)).await.is_err() {
                    return Outcome::Cancelled;
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, "Model failed mid-stream");
                let _ = tx.send(ChatEvent::Error(e.to_string())).await;
                return Outcome::Failed;
            }
            None => {
                let _ = tx.send(ChatEvent::Done).await;
                return Outcome::Completed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{ConfigurationError, ModelInvocationError};
    use crate::llm::ModelClient;

    /// Replays a fixed script and records the histories it was called with.
    struct Scripted {
        open_error: Option<String>,
        script: Vec<Result<String, String>>,
        hang_after_script: bool,
        calls: Mutex<Vec<Vec<Message>>>,
    }

    impl Scripted {
        fn fragments(fragments: &[&str]) -> Self {
            Self {
                open_error: None,
                script: fragments.iter().map(|f| Ok(f.to_string())).collect(),
                hang_after_script: false,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModelClient for Scripted {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn stream(&self, messages: Vec<Message>) -> Result<FragmentStream, ModelInvocationError> {
            self.calls.lock().unwrap().push(messages);
            if let Some(message) = &self.open_error {
                return Err(ModelInvocationError::Api {
                    status: 503,
                    message: message.clone(),
                });
            }
            let items: Vec<_> = self
                .script
                .iter()
                .cloned()
                .map(|item| item.map_err(ModelInvocationError::Stream))
                .collect();
            let stream = futures::stream::iter(items);
            if self.hang_after_script {
                Ok(Box::pin(stream.chain(futures::stream::pending())))
            } else {
                Ok(Box::pin(stream))
            }
        }
    }

    fn orchestrator(client: Arc<Scripted>) -> Orchestrator {
        let mut registry = ModelRegistry::new();
        registry.register("scripted", client);
        Orchestrator::new(Arc::new(registry), ConversationStore::new(), "scripted")
    }

    async fn collect(mut reply: Reply) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Some(event) = reply.events.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_fragments_then_done() {
        let client = Arc::new(Scripted::fragments(&["", "4", "", "."]));
        let orch = orchestrator(client.clone());

        let reply = orch.respond("1", "What is 2+2?".to_string()).await.unwrap();
        let events = collect(reply).await;
        assert_eq!(
            events,
            vec![
                ChatEvent::Fragment("4".to_string()),
                ChatEvent::Fragment(".".to_string()),
                ChatEvent::Done,
            ]
        );

        let history = orch.store().snapshot("1").await;
        assert_eq!(
            history,
            vec![Message::user("What is 2+2?"), Message::assistant("4.")]
        );
        assert_eq!(client.calls.lock().unwrap()[0], vec![Message::user("What is 2+2?")]);
    }

    #[tokio::test]
    async fn test_model_sees_full_history() {
        let client = Arc::new(Scripted::fragments(&["ok"]));
        let orch = orchestrator(client.clone());

        for query in ["one", "two"] {
            let reply = orch.respond("t", query.to_string()).await.unwrap();
            collect(reply).await;
        }

        let calls = client.calls.lock().unwrap();
        assert_eq!(calls[1].len(), 3);
        assert_eq!(calls[1][2], Message::user("two"));
        drop(calls);
        assert_eq!(orch.store().snapshot("t").await.len(), 4);
    }

    #[tokio::test]
    async fn test_error_on_open_is_returned() {
        let client = Arc::new(Scripted {
            open_error: Some("upstream down".to_string()),
            ..Scripted::fragments(&[])
        });
        let orch = orchestrator(client);

        let err = orch.respond("1", "hi".to_string()).await.unwrap_err();
        assert!(matches!(err, ChatError::ModelInvocation(ModelInvocationError::Api { status: 503, .. })));
        assert_eq!(orch.store().snapshot("1").await, vec![Message::user("hi")]);
    }

    #[tokio::test]
    async fn test_error_before_first_fragment_is_returned() {
        let client = Arc::new(Scripted {
            script: vec![Ok(String::new()), Err("reset".to_string())],
            ..Scripted::fragments(&[])
        });
        let orch = orchestrator(client);

        let err = orch.respond("1", "hi".to_string()).await.unwrap_err();
        assert_eq!(err.to_string(), "stream failed: reset");
    }

    #[tokio::test]
    async fn test_mid_stream_error_keeps_partial_output() {
        let client = Arc::new(Scripted {
            script: vec![Ok("par".to_string()), Err("reset".to_string()), Ok("never".to_string())],
            ..Scripted::fragments(&[])
        });
        let orch = orchestrator(client);

        let reply = orch.respond("1", "hi".to_string()).await.unwrap();
        let events = collect(reply).await;
        assert_eq!(
            events,
            vec![
                ChatEvent::Fragment("par".to_string()),
                ChatEvent::Error("stream failed: reset".to_string()),
            ]
        );
        assert_eq!(
            orch.store().snapshot("1").await,
            vec![Message::user("hi"), Message::assistant("par")]
        );
    }

    #[tokio::test]
    async fn test_empty_response_still_recorded() {
        let orch = orchestrator(Arc::new(Scripted::fragments(&[])));
        let reply = orch.respond("1", "hi".to_string()).await.unwrap();
        assert_eq!(collect(reply).await, vec![ChatEvent::Done]);
        assert_eq!(orch.store().snapshot("1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let orch = Orchestrator::new(Arc::new(ModelRegistry::new()), ConversationStore::new(), "missing");
        let err = orch.respond("1", "hi".to_string()).await.unwrap_err();
        assert!(matches!(
            err,
            ChatError::Configuration(ConfigurationError::UnknownProvider(_))
        ));
    }

    #[tokio::test]
    async fn test_dropped_receiver_releases_conversation() {
        let client = Arc::new(Scripted {
            hang_after_script: true,
            ..Scripted::fragments(&["partial"])
        });
        let orch = orchestrator(client);

        let mut reply = orch.respond("1", "hi".to_string()).await.unwrap();
        assert_eq!(
            reply.events.recv().await,
            Some(ChatEvent::Fragment("partial".to_string()))
        );
        drop(reply);

        // The upstream never ends on its own; only cancellation frees the turn.
        let turn = tokio::time::timeout(Duration::from_secs(2), orch.store().begin_turn("1"))
            .await
            .expect("conversation was not released");
        assert_eq!(
            turn.snapshot(),
            vec![Message::user("hi"), Message::assistant("partial")]
        );
    }
}
