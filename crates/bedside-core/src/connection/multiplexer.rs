//! Connection multiplexer.
//!
//! Owns every live connection and the per-session binding table. Outbound
//! session events are sequenced and fanned out under the session's outbox
//! entry, so each bound connection observes them in non-decreasing `seq`
//! order. A reconnecting client binds with its last seen `seq` and receives
//! the buffered remainder before live traffic.
//!
//! A connection whose session closes, or which falls too far behind, loses
//! its sender: its [`Outbound`] receiver drains and then yields `None`, and
//! the transport closes. A lagging client reconnects with `last_seq`.
//!
//! Lock discipline: a connection entry and an outbox entry are never held at
//! the same time.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bedside_types::config::ConnectionConfig;
use bedside_types::error::{ConnectionError, SessionError};
use bedside_types::protocol::{Envelope, ServerEvent};
use bedside_types::session::SessionStatus;

use super::outbox::SessionOutbox;
use crate::session::SessionRegistry;

/// Receiving half of a connection's outbound channel.
pub type Outbound = mpsc::Receiver<Arc<Envelope>>;

struct ConnectionState {
    /// `None` once the connection has been closed from this side.
    tx: Option<mpsc::Sender<Arc<Envelope>>>,
    session: Option<Uuid>,
    last_activity: Instant,
    last_acked: u64,
}

pub struct ConnectionMultiplexer {
    registry: Arc<SessionRegistry>,
    connections: DashMap<Uuid, ConnectionState>,
    outboxes: DashMap<Uuid, SessionOutbox>,
    config: ConnectionConfig,
}

impl ConnectionMultiplexer {
    pub fn new(registry: Arc<SessionRegistry>, config: ConnectionConfig) -> Self {
        Self {
            registry,
            connections: DashMap::new(),
            outboxes: DashMap::new(),
            config,
        }
    }

    /// Register a new transport connection. The returned receiver yields every
    /// message destined for it.
    pub fn accept(&self) -> (Uuid, Outbound) {
        let id = Uuid::now_v7();
        let (tx, rx) = mpsc::channel(self.config.outbound_buffer.max(1));
        self.connections.insert(
            id,
            ConnectionState {
                tx: Some(tx),
                session: None,
                last_activity: Instant::now(),
                last_acked: 0,
            },
        );
        debug!(connection_id = %id, "connection accepted");
        (id, rx)
    }

    /// Bind a connection to a session.
    ///
    /// Only `created` and `active` sessions accept connections. When
    /// `last_seq` is given, buffered session messages after it are replayed
    /// before live delivery resumes.
    pub async fn bind(
        &self,
        conn: Uuid,
        session_id: Uuid,
        last_seq: Option<u64>,
    ) -> Result<SessionStatus, ConnectionError> {
        if !self.connections.contains_key(&conn) {
            return Err(ConnectionError::UnknownConnection(conn));
        }
        let session = match self.registry.get(session_id).await {
            Ok(session) => session,
            Err(SessionError::NotFound(_)) => {
                return Err(match self.registry.closed_status(session_id) {
                    Some(status) => SessionError::NotActive {
                        id: session_id,
                        status,
                    },
                    None => SessionError::NotFound(session_id),
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        };
        if !matches!(session.status, SessionStatus::Created | SessionStatus::Active) {
            return Err(SessionError::NotActive {
                id: session_id,
                status: session.status,
            }
            .into());
        }

        let previous = self.bound_session(conn);
        if let Some(previous) = previous.filter(|p| *p != session_id) {
            if let Some(mut outbox) = self.outboxes.get_mut(&previous) {
                outbox.unsubscribe(conn);
            }
        }

        let tx = {
            let mut state = self
                .connections
                .get_mut(&conn)
                .ok_or(ConnectionError::UnknownConnection(conn))?;
            let tx = state
                .tx
                .clone()
                .ok_or(ConnectionError::UnknownConnection(conn))?;
            state.session = Some(session_id);
            state.last_activity = Instant::now();
            tx
        };

        let mut outbox = self
            .outboxes
            .entry(session_id)
            .or_insert_with(SessionOutbox::new);
        let joined = ServerEvent::SessionJoined {
            status: session.status,
            persona_name: session.persona.name.clone(),
            resumed: last_seq.is_some(),
            last_seq: outbox.last_seq(),
        }
        .into_envelope(Some(session_id), None);
        if tx.try_send(Arc::new(joined)).is_err() {
            warn!(connection_id = %conn, "outbound channel unavailable during bind");
        }

        if let Some(after) = last_seq {
            let mut replayed = 0usize;
            for envelope in outbox.replay_after(after) {
                if tx.try_send(Arc::clone(envelope)).is_err() {
                    warn!(connection_id = %conn, %session_id, "replay truncated, outbound channel full");
                    break;
                }
                replayed += 1;
            }
            debug!(connection_id = %conn, %session_id, after, replayed, "replayed buffered messages");
        }
        outbox.subscribe(conn, tx);
        drop(outbox);

        info!(connection_id = %conn, %session_id, status = %session.status, "connection bound");
        Ok(session.status)
    }

    /// Detach a connection from its session. The session itself is unaffected.
    pub fn unbind(&self, conn: Uuid) -> Option<Uuid> {
        let session_id = {
            let mut state = self.connections.get_mut(&conn)?;
            state.session.take()?
        };
        if let Some(mut outbox) = self.outboxes.get_mut(&session_id) {
            outbox.unsubscribe(conn);
        }
        debug!(connection_id = %conn, %session_id, "connection unbound");
        Some(session_id)
    }

    /// Unbind and forget a connection, on transport close.
    pub fn disconnect(&self, conn: Uuid) {
        self.unbind(conn);
        if self.connections.remove(&conn).is_some() {
            debug!(connection_id = %conn, "connection removed");
        }
    }

    /// Broadcast a session event to every bound connection. Returns its `seq`.
    pub fn send(&self, session_id: Uuid, event: ServerEvent) -> u64 {
        let kind = event.kind();
        let (seq, dropped) = {
            let mut outbox = self
                .outboxes
                .entry(session_id)
                .or_insert_with(SessionOutbox::new);
            outbox.publish(session_id, event, self.config.replay_buffer)
        };
        for conn in dropped {
            warn!(connection_id = %conn, %session_id, "closing lagging connection");
            if let Some(mut state) = self.connections.get_mut(&conn) {
                state.session = None;
                state.tx = None;
            }
        }
        debug!(%session_id, seq, kind, "session message sent");
        seq
    }

    /// Send an unsequenced message to a single connection.
    pub fn send_to_connection(&self, conn: Uuid, event: ServerEvent) -> Result<(), ConnectionError> {
        let (tx, session) = {
            let state = self
                .connections
                .get(&conn)
                .ok_or(ConnectionError::UnknownConnection(conn))?;
            let tx = state
                .tx
                .clone()
                .ok_or(ConnectionError::UnknownConnection(conn))?;
            (tx, state.session)
        };
        tx.try_send(Arc::new(event.into_envelope(session, None)))
            .map_err(|_| ConnectionError::UnknownConnection(conn))
    }

    pub fn ack(&self, conn: Uuid, seq: u64) {
        if let Some(mut state) = self.connections.get_mut(&conn) {
            state.last_acked = state.last_acked.max(seq);
            state.last_activity = Instant::now();
        }
    }

    pub fn last_acked(&self, conn: Uuid) -> Option<u64> {
        self.connections.get(&conn).map(|s| s.last_acked)
    }

    /// Record inbound activity on a connection.
    pub fn touch(&self, conn: Uuid) {
        if let Some(mut state) = self.connections.get_mut(&conn) {
            state.last_activity = Instant::now();
        }
    }

    /// Whether the connection has been silent for longer than the heartbeat
    /// allowance. Unknown connections count as stale.
    pub fn is_stale(&self, conn: Uuid) -> bool {
        match self.connections.get(&conn) {
            Some(state) => state.last_activity.elapsed() > self.config.stale_after(),
            None => true,
        }
    }

    pub fn bound_session(&self, conn: Uuid) -> Option<Uuid> {
        self.connections.get(&conn).and_then(|s| s.session)
    }

    pub fn subscriber_count(&self, session_id: Uuid) -> usize {
        self.outboxes
            .get(&session_id)
            .map(|o| o.subscriber_count())
            .unwrap_or(0)
    }

    pub fn last_seq(&self, session_id: Uuid) -> u64 {
        self.outboxes.get(&session_id).map(|o| o.last_seq()).unwrap_or(0)
    }

    /// Drop a session's outbox and close every connection bound to it.
    pub fn close_session(&self, session_id: Uuid) {
        if self.outboxes.remove(&session_id).is_some() {
            for mut state in self.connections.iter_mut() {
                if state.session == Some(session_id) {
                    state.session = None;
                    state.tx = None;
                }
            }
            debug!(%session_id, "session outbox closed");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use bedside_types::gateway::RoomReservation;
    use bedside_types::persona::PersonaSnapshot;
    use bedside_types::scenario::{Difficulty, Profession};
    use bedside_types::session::{NewSession, NewTurn, SessionEvent};

    fn setup(config: ConnectionConfig) -> (Arc<SessionRegistry>, ConnectionMultiplexer, Uuid) {
        let registry = Arc::new(SessionRegistry::new());
        let id = Uuid::now_v7();
        registry.create(
            id,
            NewSession {
                user_id: "u".to_string(),
                scenario_id: "s".to_string(),
                profession: Profession::Doctor,
                difficulty: Difficulty::Beginner,
                scenario_type: "consultation".to_string(),
                persona: PersonaSnapshot::default(),
                room_name: "r".to_string(),
            },
            RoomReservation {
                room_name: "r".to_string(),
                join_token: "t".to_string(),
                url: None,
            },
        );
        let mux = ConnectionMultiplexer::new(Arc::clone(&registry), config);
        (registry, mux, id)
    }

    fn drain(rx: &mut Outbound) -> Vec<Arc<Envelope>> {
        let mut out = Vec::new();
        while let Ok(env) = rx.try_recv() {
            out.push(env);
        }
        out
    }

    #[tokio::test]
    async fn test_bind_unknown_session_fails() {
        let (_registry, mux, _id) = setup(ConnectionConfig::default());
        let (conn, _rx) = mux.accept();
        let err = mux.bind(conn, Uuid::now_v7(), None).await.unwrap_err();
        assert_eq!(err.code(), "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_bind_terminal_session_is_not_active() {
        for event in [SessionEvent::Cancel, SessionEvent::Complete] {
            let (registry, mux, id) = setup(ConnectionConfig::default());
            registry.transition(id, SessionEvent::Join).await.unwrap();
            registry.transition(id, event).await.unwrap();
            let (conn, _rx) = mux.accept();
            let err = mux.bind(conn, id, None).await.unwrap_err();
            assert_eq!(err.code(), "SESSION_NOT_ACTIVE");
            assert_eq!(mux.bound_session(conn), None);

            registry.evict(id);
            let err = mux.bind(conn, id, None).await.unwrap_err();
            assert_eq!(err.code(), "SESSION_NOT_ACTIVE");
        }
    }

    #[tokio::test]
    async fn test_close_session_closes_bound_connections() {
        let (registry, mux, id) = setup(ConnectionConfig::default());
        registry.transition(id, SessionEvent::Join).await.unwrap();
        let (bound, mut rx_bound) = mux.accept();
        let (idle, mut rx_idle) = mux.accept();
        mux.bind(bound, id, None).await.unwrap();

        mux.close_session(id);
        assert_eq!(rx_bound.recv().await.map(|e| e.kind.clone()).as_deref(), Some("session_joined"));
        assert!(rx_bound.recv().await.is_none());
        assert_eq!(mux.bound_session(bound), None);
        assert!(mux.send_to_connection(bound, ServerEvent::Pong).is_err());

        assert!(rx_idle.try_recv().is_err());
        assert!(mux.send_to_connection(idle, ServerEvent::Pong).is_ok());
    }

    #[tokio::test]
    async fn test_fan_out_in_sequence_order() {
        let (_registry, mux, id) = setup(ConnectionConfig::default());
        let (a, mut rx_a) = mux.accept();
        let (b, mut rx_b) = mux.accept();
        mux.bind(a, id, None).await.unwrap();
        mux.bind(b, id, None).await.unwrap();

        for i in 0..3 {
            mux.send(id, ServerEvent::error("X", format!("m{i}")));
        }

        for rx in [&mut rx_a, &mut rx_b] {
            let got = drain(rx);
            assert_eq!(got[0].kind, "session_joined");
            let seqs: Vec<u64> = got[1..].iter().filter_map(|e| e.seq).collect();
            assert_eq!(seqs, vec![1, 2, 3]);
        }
    }

    #[tokio::test]
    async fn test_resume_replays_after_last_seq_without_touching_history() {
        let (registry, mux, id) = setup(ConnectionConfig::default());
        registry.transition(id, SessionEvent::Join).await.unwrap();
        registry.append_turn(id, NewTurn::ai("hello", 1.0, None)).await.unwrap();

        let (first, mut rx_first) = mux.accept();
        mux.bind(first, id, None).await.unwrap();
        for i in 0..3 {
            mux.send(
                id,
                ServerEvent::TtsChunk {
                    audio: String::new(),
                    format: "pcm".to_string(),
                    sequence: i,
                    is_final: i == 2,
                    turn: 1,
                },
            );
        }
        assert_eq!(drain(&mut rx_first).len(), 4);
        mux.disconnect(first);

        let (second, mut rx_second) = mux.accept();
        mux.bind(second, id, Some(1)).await.unwrap();
        mux.send(id, ServerEvent::error("X", "live"));

        let got = drain(&mut rx_second);
        assert_eq!(got[0].kind, "session_joined");
        assert_eq!(got[0].data["resumed"], true);
        let seqs: Vec<u64> = got[1..].iter().filter_map(|e| e.seq).collect();
        assert_eq!(seqs, vec![2, 3, 4]);

        let session = registry.get(id).await.unwrap();
        assert_eq!(session.turns.len(), 1);
    }

    #[tokio::test]
    async fn test_unbind_leaves_session_status() {
        let (registry, mux, id) = setup(ConnectionConfig::default());
        registry.transition(id, SessionEvent::Join).await.unwrap();
        let (conn, _rx) = mux.accept();
        mux.bind(conn, id, None).await.unwrap();
        assert_eq!(mux.subscriber_count(id), 1);
        assert_eq!(mux.unbind(conn), Some(id));
        assert_eq!(mux.subscriber_count(id), 0);
        assert_eq!(registry.status(id).await.unwrap(), SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_lagging_connection_is_closed() {
        let config = ConnectionConfig {
            outbound_buffer: 2,
            ..ConnectionConfig::default()
        };
        let (_registry, mux, id) = setup(config);
        let (conn, mut rx) = mux.accept();
        mux.bind(conn, id, None).await.unwrap();
        for i in 0..4 {
            mux.send(id, ServerEvent::error("X", format!("m{i}")));
        }
        assert_eq!(mux.bound_session(conn), None);
        assert_eq!(mux.subscriber_count(id), 0);

        // What was buffered still arrives, then the channel ends.
        let mut kinds = Vec::new();
        while let Some(env) = rx.recv().await {
            kinds.push(env.kind.clone());
        }
        assert_eq!(kinds, vec!["session_joined", "error"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_staleness() {
        let config = ConnectionConfig {
            heartbeat_secs: 10,
            max_missed_heartbeats: 3,
            ..ConnectionConfig::default()
        };
        let (_registry, mux, _id) = setup(config);
        let (conn, _rx) = mux.accept();
        tokio::time::advance(Duration::from_secs(25)).await;
        assert!(!mux.is_stale(conn));
        mux.touch(conn);
        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!mux.is_stale(conn));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(mux.is_stale(conn));
        assert!(mux.is_stale(Uuid::now_v7()));
    }

    #[tokio::test]
    async fn test_ack_is_monotonic() {
        let (_registry, mux, _id) = setup(ConnectionConfig::default());
        let (conn, _rx) = mux.accept();
        mux.ack(conn, 5);
        mux.ack(conn, 3);
        assert_eq!(mux.last_acked(conn), Some(5));
    }
}
