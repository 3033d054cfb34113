//! Adapters from a chat event channel to HTTP response bodies.
//!
//! - [`text_body`]: raw fragments as a chunked `text/plain` body. A mid-stream
//!   model failure aborts the body, which closes the connection without the
//!   terminating chunk.
//! - [`sse_stream`]: framed events (`fragment`, `done`, `error`) so a client
//!   can tell completion from failure after partial output.

use std::convert::Infallible;

use axum::body::Body;
use axum::response::sse::Event;
use bytes::Bytes;
use futures::stream::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::chat::ChatEvent;
use crate::error::ModelInvocationError;

/// Convert a chat event receiver into a streamed plain-text body.
pub fn text_body(rx: mpsc::Receiver<ChatEvent>) -> Body {
    let stream = ReceiverStream::new(rx).filter_map(|event| match event {
        ChatEvent::Fragment(text) => Some(Ok(Bytes::from(text))),
        ChatEvent::Done => None,
        ChatEvent::Error(message) => Some(Err(ModelInvocationError::Stream(message))),
    });
    Body::from_stream(stream)
}

#[derive(Debug, Serialize)]
struct FragmentData {
    content: String,
}

#[derive(Debug, Serialize)]
struct DoneData {
    request_id: String,
}

#[derive(Debug, Serialize)]
struct ErrorData {
    message: String,
}

/// Convert a chat event receiver into an SSE stream.
pub fn sse_stream(
    rx: mpsc::Receiver<ChatEvent>,
    request_id: String,
) -> impl Stream<Item = Result<Event, Infallible>> {
    ReceiverStream::new(rx).map(move |event| {
        let event = match event {
            ChatEvent::Fragment(content) => Event::default()
                .event("fragment")
                .json_data(FragmentData { content }),
            ChatEvent::Done => Event::default().event("done").json_data(DoneData {
                request_id: request_id.clone(),
            }),
            ChatEvent::Error(message) => Event::default()
                .event("error")
                .json_data(ErrorData { message }),
        };
        Ok(event.unwrap_or_else(|_| Event::default().event("error").data("{}")))
    })
}
