//! Configuration types for bedside.
//!
//! `BedsideConfig` is the top-level `config.toml`. Every section and field
//! has a default, so an empty file (or no file at all) yields a runnable
//! configuration backed by the simulated collaborators.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::gateway::Stage;
use crate::scenario::ScenarioDefinition;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BedsideConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub connections: ConnectionConfig,
    #[serde(default)]
    pub services: ServiceConfig,
    /// Scenario catalog used to resolve personas at session creation.
    #[serde(default)]
    pub scenarios: Vec<ScenarioDefinition>,
}

impl BedsideConfig {
    pub fn scenario(&self, id: &str) -> Option<&ScenarioDefinition> {
        self.scenarios.iter().find(|s| s.id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Per-stage collaborator timeouts, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_stage_secs")]
    pub transcription_secs: u64,
    #[serde(default = "default_stage_secs")]
    pub generation_secs: u64,
    #[serde(default = "default_stage_secs")]
    pub synthesis_secs: u64,
    #[serde(default = "default_scoring_secs")]
    pub scoring_secs: u64,
    #[serde(default = "default_room_secs")]
    pub room_secs: u64,
}

fn default_stage_secs() -> u64 {
    30
}

fn default_scoring_secs() -> u64 {
    60
}

fn default_room_secs() -> u64 {
    10
}

impl TimeoutConfig {
    pub fn for_stage(&self, stage: Stage) -> Duration {
        let secs = match stage {
            Stage::Transcription => self.transcription_secs,
            Stage::Generation => self.generation_secs,
            Stage::Synthesis => self.synthesis_secs,
            Stage::Scoring => self.scoring_secs,
            Stage::Room => self.room_secs,
        };
        Duration::from_secs(secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            transcription_secs: default_stage_secs(),
            generation_secs: default_stage_secs(),
            synthesis_secs: default_stage_secs(),
            scoring_secs: default_scoring_secs(),
            room_secs: default_room_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sessions older than this are reaped unless still active.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
    /// How long a completed session stays readable before eviction.
    #[serde(default = "default_completion_grace_secs")]
    pub completion_grace_secs: u64,
    /// How long completion waits for queued and in-flight turns to finish
    /// before scoring.
    #[serde(default = "default_completion_drain_secs")]
    pub completion_drain_secs: u64,
    /// Maximum pending turns per session before `QUEUE_FULL`.
    #[serde(default = "default_turn_queue_depth")]
    pub turn_queue_depth: usize,
    /// Cap on the number of history turns sent to generation. `None` sends all.
    #[serde(default)]
    pub history_window: Option<usize>,
}

fn default_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_reap_interval_secs() -> u64 {
    5 * 60
}

fn default_completion_grace_secs() -> u64 {
    5
}

fn default_completion_drain_secs() -> u64 {
    30
}

fn default_turn_queue_depth() -> usize {
    8
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    pub fn completion_grace(&self) -> Duration {
        Duration::from_secs(self.completion_grace_secs)
    }

    pub fn completion_drain(&self) -> Duration {
        Duration::from_secs(self.completion_drain_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            reap_interval_secs: default_reap_interval_secs(),
            completion_grace_secs: default_completion_grace_secs(),
            completion_drain_secs: default_completion_drain_secs(),
            turn_queue_depth: default_turn_queue_depth(),
            history_window: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Heartbeats without any inbound traffic before a connection is closed.
    #[serde(default = "default_max_missed_heartbeats")]
    pub max_missed_heartbeats: u32,
    /// Per-connection outbound channel capacity.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Outbound messages kept per session for resume.
    #[serde(default = "default_replay_buffer")]
    pub replay_buffer: usize,
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_max_missed_heartbeats() -> u32 {
    3
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_replay_buffer() -> usize {
    512
}

impl ConnectionConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    /// Inactivity after which a connection counts as stale.
    pub fn stale_after(&self) -> Duration {
        self.heartbeat() * self.max_missed_heartbeats.max(1)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat_secs(),
            max_missed_heartbeats: default_max_missed_heartbeats(),
            outbound_buffer: default_outbound_buffer(),
            replay_buffer: default_replay_buffer(),
        }
    }
}

/// Collaborator endpoints. When a base URL is absent the corresponding
/// simulated collaborator is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub ai_base_url: Option<String>,
    #[serde(default)]
    pub room_base_url: Option<String>,
    /// Environment variable holding the collaborator API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Base URL clients use to reach this server's websocket endpoint.
    #[serde(default = "default_public_ws_url")]
    pub public_ws_url: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub default_voice: Option<String>,
}

fn default_api_key_env() -> String {
    "BEDSIDE_API_KEY".to_string()
}

fn default_public_ws_url() -> String {
    "ws://127.0.0.1:8080".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            ai_base_url: None,
            room_base_url: None,
            api_key_env: default_api_key_env(),
            public_ws_url: default_public_ws_url(),
            language: default_language(),
            default_voice: None,
        }
    }
}
