//! OpenAI-compatible streaming chat client.
//!
//! Works with any provider exposing `POST {base_url}/chat/completions` with
//! `stream: true` (Groq, OpenRouter, Google's OpenAI endpoint, OpenAI itself).

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::client::{FragmentStream, ModelClient};
use super::sse::SseDecoder;
use super::types::Message;
use crate::error::ModelInvocationError;

/// Streaming client for one OpenAI-compatible endpoint.
pub struct OpenAICompatibleClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OpenAICompatibleClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_sampling(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl ModelClient for OpenAICompatibleClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn stream(&self, messages: Vec<Message>) -> Result<FragmentStream, ModelInvocationError> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = StreamRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: true,
        };

        debug!(url = %url, model = %self.model, messages = request.messages.len(), "Opening completion stream");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelInvocationError::Api {
                status,
                message: error_message(&body),
            });
        }

        Ok(Box::pin(ChunkStream::new(response.bytes_stream())))
    }
}

#[derive(Serialize)]
struct StreamRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<ProviderError>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ProviderError {
    #[serde(default)]
    message: String,
}

/// Longest provider error text passed on to callers.
const MAX_ERROR_CHARS: usize = 300;

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Object { message: String },
    Text(String),
}

/// Reduce an error response body to a short message.
///
/// JSON bodies of the `{"error": {"message": ..}}` or `{"error": ".."}` shape
/// yield their message; anything else (HTML pages, plain text) is cut down.
fn error_message(body: &str) -> String {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error: ErrorDetail::Object { message } | ErrorDetail::Text(message),
        }) => message,
        Err(_) => body.trim().to_string(),
    };
    shorten(&message)
}

fn shorten(text: &str) -> String {
    if text.chars().count() <= MAX_ERROR_CHARS {
        return text.to_string();
    }
    let mut short: String = text.chars().take(MAX_ERROR_CHARS).collect();
    short.push_str("...");
    short
}

/// Turns a chat completion SSE body into text fragments.
struct ChunkStream<S> {
    inner: S,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    done: bool,
}

impl<S> ChunkStream<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }
}

/// Interpret one event payload. `Ok(None)` means "nothing to emit".
fn parse_payload(payload: &str) -> Result<Option<String>, ModelInvocationError> {
    let chunk: StreamChunk = serde_json::from_str(payload)
        .map_err(|e| ModelInvocationError::Malformed(format!("{e}: {}", shorten(payload))))?;

    if let Some(error) = chunk.error {
        return Err(ModelInvocationError::Stream(error.message));
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

impl<S> Stream for ChunkStream<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    type Item = Result<String, ModelInvocationError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(payload) = self.pending.pop_front() {
                if payload.trim() == "[DONE]" {
                    self.done = true;
                    self.pending.clear();
                    return Poll::Ready(None);
                }
                match parse_payload(&payload) {
                    Ok(Some(text)) => return Poll::Ready(Some(Ok(text))),
                    Ok(None) => continue,
                    Err(e) => {
                        self.done = true;
                        self.pending.clear();
                        return Poll::Ready(Some(Err(e)));
                    }
                }
            }

            if self.done {
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => match self.decoder.feed(&bytes) {
                    Ok(events) => self.pending.extend(events),
                    Err(e) => {
                        self.done = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                },
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(ModelInvocationError::Request(e))));
                }
                Poll::Ready(None) => {
                    // Body ended without [DONE]; drain whatever is buffered.
                    self.done = true;
                    match self.decoder.finish() {
                        Ok(Some(last)) => self.pending.push_back(last),
                        Ok(None) => {}
                        Err(e) => return Poll::Ready(Some(Err(e))),
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
