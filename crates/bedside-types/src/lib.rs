//! Shared domain types for bedside.
//!
//! This crate contains the domain model of a practice session: sessions and
//! their conversation turns, patient persona snapshots, the client/server
//! wire protocol, collaborator payloads, configuration, and error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod gateway;
pub mod persona;
pub mod protocol;
pub mod scenario;
pub mod session;
