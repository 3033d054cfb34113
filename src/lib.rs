//! query-relay: streaming HTTP relay for hosted LLM chat.
//!
//! Accepts a text query, appends it to a per-thread conversation, sends the
//! whole conversation to an OpenAI-compatible provider and streams the
//! model's answer back fragment by fragment.

pub mod chat;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod server;
