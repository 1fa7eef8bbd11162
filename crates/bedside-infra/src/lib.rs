//! Infrastructure layer for bedside.
//!
//! Concrete implementations of the collaborator traits defined in
//! `bedside-core`: HTTP clients for the AI service and the room service, an
//! offline simulated set for local development, and TOML config loading.

pub mod config;
pub mod gateways;
pub mod service;
pub mod simulated;

pub use gateways::build_gateways;
