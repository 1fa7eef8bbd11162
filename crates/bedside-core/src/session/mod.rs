//! Session state ownership, lifecycle transitions, and expiry.

pub mod lifecycle;
pub mod reaper;
pub mod registry;

pub use lifecycle::{Completion, CreateSessionRequest, SessionLifecycle, SessionTicket};
pub use reaper::SessionReaper;
pub use registry::{SessionRegistry, TurnGuard};
