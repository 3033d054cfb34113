//! Model clients and the provider registry.
//!
//! - [`types`]: chat messages exchanged with providers
//! - [`client`]: the [`ModelClient`] trait every provider implements
//! - [`openai`]: streaming client for OpenAI-compatible chat completion APIs
//! - [`sse`]: incremental server-sent-events decoder
//! - [`registry`]: providers built once at startup, selected by name

pub mod client;
pub mod openai;
pub mod registry;
pub mod sse;
pub mod types;

pub use client::{FragmentStream, ModelClient};
pub use openai::OpenAICompatibleClient;
pub use registry::ModelRegistry;
pub use types::{Message, Role};
