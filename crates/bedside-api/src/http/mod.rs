//! REST and WebSocket surface.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod router;
