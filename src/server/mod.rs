//! HTTP gateway.
//!
//! - [`api`]: routes, shared state and request validation
//! - [`streaming`]: plain-text and SSE bodies for streamed responses

pub mod api;
pub mod streaming;
