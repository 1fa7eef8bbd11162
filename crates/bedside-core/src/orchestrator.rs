//! The session orchestrator: wires registry, multiplexer, lifecycle, and turn
//! queue together and dispatches inbound client messages.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, warn};
use uuid::Uuid;

use bedside_types::config::BedsideConfig;
use bedside_types::error::{ConnectionError, ProtocolError, SessionError};
use bedside_types::protocol::{ClientCommand, ClientMessage, ServerEvent};
use bedside_types::session::SessionStatus;

use crate::connection::{ConnectionMultiplexer, Outbound};
use crate::gateway::Gateways;
use crate::pipeline::{TurnJob, TurnPipeline, TurnQueue};
use crate::prompt::PersonaPromptBuilder;
use crate::session::{
    Completion, CreateSessionRequest, SessionLifecycle, SessionReaper, SessionRegistry,
    SessionTicket,
};

pub struct SessionOrchestrator {
    registry: Arc<SessionRegistry>,
    multiplexer: Arc<ConnectionMultiplexer>,
    lifecycle: Arc<SessionLifecycle>,
    pipeline: Arc<TurnPipeline>,
    queue: TurnQueue,
    config: BedsideConfig,
}

impl SessionOrchestrator {
    pub fn new(config: BedsideConfig, gateways: Gateways) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let multiplexer = Arc::new(ConnectionMultiplexer::new(
            Arc::clone(&registry),
            config.connections.clone(),
        ));
        let lifecycle = Arc::new(SessionLifecycle::new(
            Arc::clone(&registry),
            Arc::clone(&multiplexer),
            gateways.clone(),
            config.scenarios.clone(),
            config.sessions.clone(),
        ));
        let pipeline = Arc::new(TurnPipeline::new(
            Arc::clone(&registry),
            Arc::clone(&multiplexer),
            gateways,
            PersonaPromptBuilder::new(config.sessions.history_window),
            config.services.language.clone(),
            config.services.default_voice.clone(),
        ));
        let queue = TurnQueue::new(
            Arc::clone(&registry),
            Arc::clone(&pipeline),
            Arc::clone(&lifecycle),
            config.sessions.turn_queue_depth,
        );
        Self {
            registry,
            multiplexer,
            lifecycle,
            pipeline,
            queue,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn multiplexer(&self) -> &Arc<ConnectionMultiplexer> {
        &self.multiplexer
    }

    pub fn lifecycle(&self) -> &Arc<SessionLifecycle> {
        &self.lifecycle
    }

    pub fn pipeline(&self) -> &Arc<TurnPipeline> {
        &self.pipeline
    }

    pub fn queue(&self) -> &TurnQueue {
        &self.queue
    }

    pub fn config(&self) -> &BedsideConfig {
        &self.config
    }

    pub async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<SessionTicket, SessionError> {
        self.lifecycle.create(request).await
    }

    /// Complete a session once its pending turns have been answered, so the
    /// transcript that gets scored ends with the persona's reply.
    pub async fn complete_session(
        &self,
        id: Uuid,
        duration: Option<u64>,
    ) -> Result<Completion, SessionError> {
        self.queue
            .drain(id, self.config.sessions.completion_drain())
            .await;
        self.lifecycle.complete(id, duration).await
    }

    pub async fn cancel_session(&self, id: Uuid) -> Result<(), SessionError> {
        self.lifecycle.cancel(id).await.map(|_| ())
    }

    /// A reaper over this orchestrator's sessions, using the configured TTL
    /// and sweep interval.
    pub fn reaper(&self) -> SessionReaper {
        SessionReaper::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.lifecycle),
            self.config.sessions.ttl(),
            self.config.sessions.reap_interval(),
        )
    }

    /// Authenticate with the session's join token, then accept and bind a
    /// connection.
    pub async fn connect(
        &self,
        session_id: Uuid,
        token: &str,
        last_seq: Option<u64>,
    ) -> Result<(Uuid, Outbound), ConnectionError> {
        if !self.registry.join_token_matches(session_id, token)? {
            warn!(%session_id, "join token rejected");
            return Err(ConnectionError::Unauthorized);
        }
        let (conn, rx) = self.multiplexer.accept();
        match self.multiplexer.bind(conn, session_id, last_seq).await {
            Ok(_) => Ok((conn, rx)),
            Err(e) => {
                self.multiplexer.disconnect(conn);
                Err(e)
            }
        }
    }

    pub fn disconnect(&self, conn: Uuid) {
        self.multiplexer.disconnect(conn);
    }

    /// Handle one inbound text frame. Failures are reported to the sending
    /// connection as `error` messages and never affect other connections.
    pub async fn handle_frame(&self, conn: Uuid, raw: &str) {
        self.multiplexer.touch(conn);
        let result = match ClientMessage::from_json(raw).and_then(ClientMessage::into_command) {
            Ok(command) => self.dispatch(conn, command).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            debug!(connection_id = %conn, code = e.code(), error = %e, "client message rejected");
            let _ = self
                .multiplexer
                .send_to_connection(conn, ServerEvent::error(e.code(), e.to_string()));
        }
    }

    pub async fn dispatch(&self, conn: Uuid, command: ClientCommand) -> Result<(), ConnectionError> {
        match command {
            ClientCommand::Ping => self.multiplexer.send_to_connection(conn, ServerEvent::Pong),
            ClientCommand::Ack(ack) => {
                self.multiplexer.ack(conn, ack.seq);
                Ok(())
            }
            ClientCommand::SessionStart => {
                let id = self.bound_session(conn)?;
                if self.ensure_active(id).await? {
                    self.queue.submit(id, TurnJob::Greeting).await?;
                }
                Ok(())
            }
            ClientCommand::Audio(payload) => {
                let id = self.bound_session(conn)?;
                let audio = BASE64
                    .decode(payload.audio.as_bytes())
                    .map_err(|e| ProtocolError::InvalidAudio(e.to_string()))?;
                self.ensure_active(id).await?;
                self.queue
                    .submit(
                        id,
                        TurnJob::Audio {
                            audio,
                            hint: payload.transcript,
                        },
                    )
                    .await?;
                Ok(())
            }
            ClientCommand::Text(payload) => {
                let id = self.bound_session(conn)?;
                self.ensure_active(id).await?;
                self.queue
                    .submit(
                        id,
                        TurnJob::Text {
                            text: payload.text.trim().to_string(),
                        },
                    )
                    .await?;
                Ok(())
            }
        }
    }

    fn bound_session(&self, conn: Uuid) -> Result<Uuid, ConnectionError> {
        self.multiplexer
            .bound_session(conn)
            .ok_or(ConnectionError::Unbound(conn))
    }

    /// Join a `created` session on first use. Returns `true` when this call
    /// performed the join.
    async fn ensure_active(&self, id: Uuid) -> Result<bool, SessionError> {
        match self.registry.status(id).await? {
            SessionStatus::Active => Ok(false),
            SessionStatus::Created => match self.lifecycle.join(id).await {
                Ok(_) => Ok(true),
                Err(SessionError::InvalidTransition { .. })
                    if self.registry.status(id).await? == SessionStatus::Active =>
                {
                    Ok(false)
                }
                Err(e) => Err(e),
            },
            status => Err(SessionError::NotActive { id, status }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::testing::{MockGateways, collect_kinds, collect_labels, harness};

    #[tokio::test(start_paused = true)]
    async fn test_create_then_audio_scenario() {
        let h = harness(MockGateways::default());
        let ticket = h.create_session().await;
        let (conn, mut rx) = h.connect(&ticket).await;

        h.orchestrator
            .handle_frame(conn, r#"{"type":"audio","data":{"audio":"AAECAw==","transcript":"Any allergies?"}}"#)
            .await;

        let labels = collect_labels(&mut rx, |k| k == "tts_chunk(final)").await;
        assert_eq!(
            labels,
            vec![
                "session_joined",
                "session_started",
                "transcription",
                "audio_quality",
                "ai_response",
                "tts_chunk",
                "tts_chunk",
                "tts_chunk(final)",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_start_greets_once() {
        let h = harness(MockGateways::default());
        let ticket = h.create_session().await;
        let (conn, mut rx) = h.connect(&ticket).await;

        h.orchestrator.handle_frame(conn, r#"{"type":"session_start"}"#).await;
        let kinds = collect_kinds(&mut rx, |_| false).await;
        assert_eq!(kinds.iter().filter(|k| *k == "ai_greeting").count(), 1);

        h.orchestrator.handle_frame(conn, r#"{"type":"session_start"}"#).await;
        let kinds = collect_kinds(&mut rx, |_| false).await;
        assert!(!kinds.iter().any(|k| k == "ai_greeting"));
        let session = h.orchestrator.registry().get(ticket.session_id).await.unwrap();
        assert_eq!(session.turns.len(), 1);
    }

    #[tokio::test]
    async fn test_ping_pong_is_connection_scoped() {
        let h = harness(MockGateways::default());
        let ticket = h.create_session().await;
        let (a, mut rx_a) = h.connect(&ticket).await;
        let (_b, mut rx_b) = h.connect(&ticket).await;
        while rx_a.try_recv().is_ok() {}
        while rx_b.try_recv().is_ok() {}

        h.orchestrator.handle_frame(a, r#"{"type":"ping"}"#).await;
        let pong = rx_a.try_recv().unwrap();
        assert_eq!(pong.kind, "pong");
        assert!(pong.seq.is_none());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_bad_frames_report_errors() {
        let h = harness(MockGateways::default());
        let ticket = h.create_session().await;
        let (conn, mut rx) = h.connect(&ticket).await;
        while rx.try_recv().is_ok() {}

        for (raw, code) in [
            ("{not json", "MALFORMED_MESSAGE"),
            (r#"{"type":"shout"}"#, "UNKNOWN_MESSAGE_TYPE"),
            (r#"{"type":"audio","data":{"audio":"***"}}"#, "INVALID_AUDIO"),
        ] {
            h.orchestrator.handle_frame(conn, raw).await;
            let env = rx.try_recv().unwrap();
            assert_eq!(env.kind, "error");
            assert_eq!(env.data["code"], code);
        }
        let status = h.orchestrator.registry().status(ticket.session_id).await.unwrap();
        assert_eq!(status, SessionStatus::Created);
    }

    #[tokio::test]
    async fn test_connect_rejects_wrong_token() {
        let h = harness(MockGateways::default());
        let ticket = h.create_session().await;
        let err = h
            .orchestrator
            .connect(ticket.session_id, "forged", None)
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), "UNAUTHORIZED");
        assert_eq!(h.orchestrator.multiplexer().connection_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_to_cancelled_session_is_not_active() {
        let h = harness(MockGateways::default());
        let ticket = h.create_session().await;
        h.orchestrator.cancel_session(ticket.session_id).await.unwrap();
        let err = h
            .orchestrator
            .connect(ticket.session_id, &ticket.join_token, None)
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), "SESSION_NOT_ACTIVE");
        assert_eq!(h.orchestrator.multiplexer().connection_count(), 0);

        let err = h
            .orchestrator
            .connect(ticket.session_id, "forged", None)
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), "UNAUTHORIZED");
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_after_completion_grace_is_not_active() {
        let h = harness(MockGateways::default());
        let ticket = h.create_session().await;
        h.orchestrator.lifecycle().join(ticket.session_id).await.unwrap();
        h.orchestrator.complete_session(ticket.session_id, None).await.unwrap();

        for wait in [Duration::ZERO, Duration::from_secs(6)] {
            tokio::time::sleep(wait).await;
            let err = h
                .orchestrator
                .connect(ticket.session_id, &ticket.join_token, None)
                .await
                .err()
                .unwrap();
            assert_eq!(err.code(), "SESSION_NOT_ACTIVE");
        }
        assert!(h.orchestrator.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_closes_bound_connections() {
        let h = harness(MockGateways::default());
        let ticket = h.create_session().await;
        let (conn, mut rx) = h.connect(&ticket).await;
        h.orchestrator.cancel_session(ticket.session_id).await.unwrap();

        let closed = tokio::time::timeout(Duration::from_secs(1), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok());
        assert_eq!(h.orchestrator.multiplexer().bound_session(conn), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_waits_for_pending_reply() {
        let h = harness(MockGateways {
            generation_delay: Duration::from_millis(500),
            ..MockGateways::default()
        });
        let ticket = h.create_session().await;
        let id = ticket.session_id;
        let (conn, mut rx) = h.connect(&ticket).await;

        h.orchestrator
            .handle_frame(conn, r#"{"type":"text","data":{"text":"Where does it hurt?"}}"#)
            .await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let completion = h.orchestrator.complete_session(id, None).await.unwrap();

        let kinds = collect_kinds(&mut rx, |k| k == "session_completed").await;
        let reply = kinds.iter().position(|k| k == "ai_response").unwrap();
        let completed = kinds.iter().position(|k| k == "session_completed").unwrap();
        assert!(reply < completed);

        let speakers: Vec<String> = completion
            .session
            .turns
            .iter()
            .map(|t| t.speaker.to_string())
            .collect();
        assert_eq!(speakers, vec!["user", "ai"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_resume_does_not_duplicate_turns() {
        let h = harness(MockGateways::default());
        let ticket = h.create_session().await;
        let (conn, mut rx) = h.connect(&ticket).await;
        h.orchestrator
            .handle_frame(conn, r#"{"type":"text","data":{"text":"How long has this been going on?"}}"#)
            .await;
        collect_labels(&mut rx, |k| k == "tts_chunk(final)").await;
        let before = h.orchestrator.registry().get(ticket.session_id).await.unwrap();
        h.orchestrator.disconnect(conn);

        let (_again, mut rx2) = h
            .orchestrator
            .connect(ticket.session_id, &ticket.join_token, Some(2))
            .await
            .unwrap();
        let replayed = collect_kinds(&mut rx2, |_| false).await;
        assert_eq!(replayed[0], "session_joined");
        assert!(replayed.iter().filter(|k| *k == "tts_chunk").count() >= 1);

        let after = h.orchestrator.registry().get(ticket.session_id).await.unwrap();
        assert_eq!(before.turns, after.turns);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_then_no_completion_ever() {
        let h = harness(MockGateways::default());
        let ticket = h.create_session().await;
        let (conn, mut rx) = h.connect(&ticket).await;
        h.orchestrator.cancel_session(ticket.session_id).await.unwrap();

        h.orchestrator.handle_frame(conn, r#"{"type":"text","data":{"text":"hello"}}"#).await;
        let kinds = collect_kinds(&mut rx, |_| false).await;
        assert!(!kinds.iter().any(|k| k == "session_completed"));
        assert!(
            h.orchestrator
                .complete_session(ticket.session_id, None)
                .await
                .is_err()
        );
    }
}
