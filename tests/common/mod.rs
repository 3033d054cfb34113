//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use axum::Router;
use http_body_util::BodyExt;

use query_relay::chat::Orchestrator;
use query_relay::conversation::ConversationStore;
use query_relay::error::ModelInvocationError;
use query_relay::llm::{FragmentStream, Message, ModelClient, ModelRegistry};
use query_relay::server::api::{build_router, AppState};

pub const PROVIDER: &str = "scripted";
pub const DEFAULT_THREAD: &str = "1";

/// A model client that replays a fixed script.
pub struct ScriptedClient {
    pub script: Vec<Result<String, String>>,
    pub open_error: Option<(u16, String)>,
    pub calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedClient {
    pub fn fragments(fragments: &[&str]) -> Self {
        Self {
            script: fragments.iter().map(|f| Ok(f.to_string())).collect(),
            open_error: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(status: u16, message: &str) -> Self {
        Self {
            open_error: Some((status, message.to_string())),
            ..Self::fragments(&[])
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn stream(&self, messages: Vec<Message>) -> Result<FragmentStream, ModelInvocationError> {
        self.calls.lock().unwrap().push(messages);
        if let Some((status, message)) = &self.open_error {
            return Err(ModelInvocationError::Api {
                status: *status,
                message: message.clone(),
            });
        }
        let items: Vec<_> = self
            .script
            .iter()
            .cloned()
            .map(|item| item.map_err(ModelInvocationError::Stream))
            .collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

/// A model client whose completion never starts.
pub struct HangingClient;

#[async_trait]
impl ModelClient for HangingClient {
    fn model(&self) -> &str {
        "hanging-model"
    }

    async fn stream(&self, _messages: Vec<Message>) -> Result<FragmentStream, ModelInvocationError> {
        futures::future::pending().await
    }
}

/// Build a router whose only provider is `registry`'s entry named [`PROVIDER`].
pub fn app_with_registry(registry: ModelRegistry) -> (Router, Arc<AppState>) {
    app_with_limit(registry, 16)
}

pub fn app_with_limit(registry: ModelRegistry, max_concurrent_requests: usize) -> (Router, Arc<AppState>) {
    let registry = Arc::new(registry);
    let orchestrator = Orchestrator::new(registry.clone(), ConversationStore::new(), PROVIDER);
    let state = Arc::new(AppState {
        orchestrator,
        registry,
        default_thread_id: DEFAULT_THREAD.to_string(),
        start_time: Instant::now(),
    });
    (build_router(state.clone(), max_concurrent_requests), state)
}

pub fn app(client: Arc<ScriptedClient>) -> (Router, Arc<AppState>) {
    let mut registry = ModelRegistry::new();
    registry.register(PROVIDER, client);
    app_with_registry(registry)
}

pub fn query_request(body: serde_json::Value) -> Request<Body> {
    post_json("/query", body)
}

pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_string(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(body: Body) -> serde_json::Value {
    serde_json::from_str(&body_string(body).await).unwrap()
}
