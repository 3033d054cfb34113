//! The model client abstraction.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use super::types::Message;
use crate::error::ModelInvocationError;

/// Incremental response text from a model, in arrival order.
pub type FragmentStream =
    Pin<Box<dyn Stream<Item = Result<String, ModelInvocationError>> + Send>>;

/// A configured connection to one provider.
///
/// Clients are built once and shared across requests; they hold no
/// conversation state.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Model identifier this client sends requests for.
    fn model(&self) -> &str;

    /// Start a streaming completion over the full message history.
    ///
    /// Errors returned here happen before any fragment exists; errors after
    /// that arrive as items of the returned stream.
    async fn stream(&self, messages: Vec<Message>) -> Result<FragmentStream, ModelInvocationError>;
}
