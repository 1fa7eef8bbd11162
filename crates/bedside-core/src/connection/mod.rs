//! Transport connections and their binding to sessions.

pub mod multiplexer;
mod outbox;

pub use multiplexer::{ConnectionMultiplexer, Outbound};
