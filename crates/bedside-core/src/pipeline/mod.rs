//! Per-utterance turn execution and its per-session serialization.

pub mod queue;
pub mod turn;

pub use queue::TurnQueue;
pub use turn::{TurnJob, TurnPipeline, UNTRANSCRIBED};
