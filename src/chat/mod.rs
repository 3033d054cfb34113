//! Chat turn orchestration.

pub mod orchestrator;

pub use orchestrator::{ChatEvent, Orchestrator, Reply};
