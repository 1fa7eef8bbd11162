//! Session orchestration for bedside.
//!
//! This crate owns the live state of practice sessions and drives each
//! conversational turn through the external collaborators. Collaborators are
//! defined here as traits ("ports"); concrete clients live in `bedside-infra`.
//! Nothing in this crate performs network IO directly.

pub mod connection;
pub mod gateway;
pub mod orchestrator;
pub mod pipeline;
pub mod prompt;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use orchestrator::SessionOrchestrator;
