//! In-memory session registry.
//!
//! The registry is the only owner of session state. Each session lives in its
//! own slot behind a `tokio::sync::Mutex`, so mutations to one session are
//! serialized while unrelated sessions proceed in parallel. All writes go
//! through [`SessionRegistry::transition`] and [`SessionRegistry::append_turn`].
//!
//! Evicting a session that reached a terminal status leaves a tombstone, so
//! late reconnects are told the session is over rather than unknown.
//! Tombstones are pruned with the same TTL as sessions.

use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bedside_types::error::SessionError;
use bedside_types::gateway::RoomReservation;
use bedside_types::session::{NewSession, NewTurn, Session, SessionEvent, SessionStatus, Turn};

struct SessionEntry {
    session: Session,
    room: Option<RoomReservation>,
}

struct SessionSlot {
    entry: Mutex<SessionEntry>,
    join_token: String,
    /// Set once, on the transition into a terminal status.
    closed: OnceLock<SessionStatus>,
    /// Cancelled on any terminal transition or eviction.
    cancel: CancellationToken,
    in_flight: AtomicBool,
}

/// Marks a turn as in flight for its session. Clears the flag on drop, including
/// when the turn task unwinds.
pub struct TurnGuard {
    slot: Arc<SessionSlot>,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.slot.in_flight.store(false, Ordering::Release);
    }
}

struct Tombstone {
    status: SessionStatus,
    join_token: String,
    evicted_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, Arc<SessionSlot>>,
    tombstones: DashMap<Uuid, Tombstone>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: Uuid) -> Result<Arc<SessionSlot>, SessionError> {
        self.sessions
            .get(&id)
            .map(|s| Arc::clone(s.value()))
            .ok_or(SessionError::NotFound(id))
    }

    /// Register a new session in `created` status holding `room`.
    pub fn create(&self, id: Uuid, params: NewSession, room: RoomReservation) -> Session {
        let session = Session::new(id, params, Utc::now());
        let slot = SessionSlot {
            entry: Mutex::new(SessionEntry {
                session: session.clone(),
                room: Some(room.clone()),
            }),
            join_token: room.join_token,
            closed: OnceLock::new(),
            cancel: CancellationToken::new(),
            in_flight: AtomicBool::new(false),
        };
        self.sessions.insert(id, Arc::new(slot));
        info!(session_id = %id, user_id = %session.user_id, scenario = %session.scenario_id, "session created");
        session
    }

    /// Snapshot of the session, including its turn history.
    pub async fn get(&self, id: Uuid) -> Result<Session, SessionError> {
        let slot = self.slot(id)?;
        let entry = slot.entry.lock().await;
        Ok(entry.session.clone())
    }

    pub async fn status(&self, id: Uuid) -> Result<SessionStatus, SessionError> {
        let slot = self.slot(id)?;
        let entry = slot.entry.lock().await;
        Ok(entry.session.status)
    }

    /// Apply a lifecycle event. Rejected transitions leave the session untouched.
    pub async fn transition(&self, id: Uuid, event: SessionEvent) -> Result<Session, SessionError> {
        let slot = self.slot(id)?;
        let mut entry = slot.entry.lock().await;
        let from = entry.session.status;
        match entry.session.apply(event, Utc::now()) {
            Ok(to) => {
                if to.is_terminal() {
                    let _ = slot.closed.set(to);
                    slot.cancel.cancel();
                }
                info!(session_id = %id, %from, %to, %event, "session transition");
                Ok(entry.session.clone())
            }
            Err(e) => {
                warn!(session_id = %id, %from, %event, "rejected session transition");
                Err(e)
            }
        }
    }

    /// Append a turn, allocating its sequence number in the same critical section.
    pub async fn append_turn(&self, id: Uuid, turn: NewTurn) -> Result<Turn, SessionError> {
        let slot = self.slot(id)?;
        let mut entry = slot.entry.lock().await;
        let turn = entry.session.append(turn, Utc::now())?;
        debug!(session_id = %id, sequence = turn.sequence, speaker = %turn.speaker, "turn appended");
        Ok(turn)
    }

    /// Claim the session's single in-flight slot.
    ///
    /// A second claim while one is held is an invariant violation and is
    /// reported as `Fatal`.
    pub fn begin_turn(&self, id: Uuid) -> Result<TurnGuard, SessionError> {
        let slot = self.slot(id)?;
        if slot
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::Fatal {
                id,
                reason: "turn started while another turn was in flight".to_string(),
            });
        }
        Ok(TurnGuard { slot })
    }

    pub fn turn_in_flight(&self, id: Uuid) -> bool {
        self.sessions
            .get(&id)
            .is_some_and(|s| s.in_flight.load(Ordering::Acquire))
    }

    pub fn cancellation(&self, id: Uuid) -> Result<CancellationToken, SessionError> {
        Ok(self.slot(id)?.cancel.clone())
    }

    /// Check a join token against a live session, or against the tombstone of
    /// an evicted one.
    pub fn join_token_matches(&self, id: Uuid, token: &str) -> Result<bool, SessionError> {
        if let Some(slot) = self.sessions.get(&id) {
            return Ok(constant_time_eq(slot.join_token.as_bytes(), token.as_bytes()));
        }
        self.tombstones
            .get(&id)
            .map(|t| constant_time_eq(t.join_token.as_bytes(), token.as_bytes()))
            .ok_or(SessionError::NotFound(id))
    }

    /// Terminal status of an evicted session, while its tombstone lasts.
    pub fn closed_status(&self, id: Uuid) -> Option<SessionStatus> {
        self.tombstones.get(&id).map(|t| t.status)
    }

    /// Remove the room reservation so it is released at most once.
    pub async fn take_room(&self, id: Uuid) -> Option<RoomReservation> {
        let slot = self.slot(id).ok()?;
        let mut entry = slot.entry.lock().await;
        entry.room.take()
    }

    /// Remove a session from the registry. Cancels any in-flight work.
    pub fn evict(&self, id: Uuid) -> bool {
        // Tombstone before removal: a concurrent bind sees at least one.
        if let Some(slot) = self.sessions.get(&id).map(|s| Arc::clone(s.value())) {
            if let Some(status) = slot.closed.get() {
                self.tombstones.insert(
                    id,
                    Tombstone {
                        status: *status,
                        join_token: slot.join_token.clone(),
                        evicted_at: Utc::now(),
                    },
                );
            }
        }
        match self.sessions.remove(&id) {
            Some((_, slot)) => {
                slot.cancel.cancel();
                info!(session_id = %id, "session evicted");
                true
            }
            None => false,
        }
    }

    /// Sessions that are not `active` and were created more than `ttl` before `now`.
    pub async fn expired(&self, ttl: Duration, now: DateTime<Utc>) -> Vec<Uuid> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let slots: Vec<(Uuid, Arc<SessionSlot>)> = self
            .sessions
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect();

        let mut expired = Vec::new();
        for (id, slot) in slots {
            let entry = slot.entry.lock().await;
            let session = &entry.session;
            if session.status != SessionStatus::Active && now - session.created_at > ttl {
                expired.push(id);
            }
        }
        expired
    }

    /// Drop tombstones older than `ttl`. Returns how many were removed.
    pub fn prune_tombstones(&self, ttl: Duration, now: DateTime<Utc>) -> usize {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let before = self.tombstones.len();
        self.tombstones.retain(|_, t| now - t.evicted_at <= ttl);
        before - self.tombstones.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Constant-time byte comparison (XOR-based).
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
