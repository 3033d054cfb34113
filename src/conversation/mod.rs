//! In-memory conversation history.

pub mod store;

pub use store::{Conversation, ConversationStore, TurnGuard};
