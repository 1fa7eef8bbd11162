//! Practice session, conversation turn, and lifecycle types.
//!
//! A session moves through a small state machine:
//!
//! ```text
//! created --join--> active --complete--> completed
//!    |                 |----cancel----> cancelled
//!    |                 '----fatal-----> error
//!    |----cancel----> cancelled
//!    '----fatal-----> error
//! ```
//!
//! Terminal statuses never transition again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::error::SessionError;
use crate::persona::PersonaSnapshot;
use crate::scenario::{Difficulty, Profession};

/// Lifecycle status of a practice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Created,
    Active,
    Completed,
    Cancelled,
    Error,
}

impl SessionStatus {
    /// Whether the session has reached a status it can never leave.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::Error
        )
    }

    /// Apply a lifecycle event. Returns `None` when the event is not allowed
    /// from this status.
    pub fn next(self, event: SessionEvent) -> Option<SessionStatus> {
        use SessionEvent as E;
        use SessionStatus as S;
        match (self, event) {
            (S::Created, E::Join) => Some(S::Active),
            (S::Created, E::Cancel) => Some(S::Cancelled),
            (S::Created, E::Fatal) => Some(S::Error),
            (S::Active, E::Complete) => Some(S::Completed),
            (S::Active, E::Cancel) => Some(S::Cancelled),
            (S::Active, E::Fatal) => Some(S::Error),
            _ => None,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Created => write!(f, "created"),
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Cancelled => write!(f, "cancelled"),
            SessionStatus::Error => write!(f, "error"),
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" => Ok(SessionStatus::Created),
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            "error" => Ok(SessionStatus::Error),
            other => Err(format!("invalid session status: '{other}'")),
        }
    }
}

/// Events that drive the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionEvent {
    Join,
    Complete,
    Cancel,
    Fatal,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Join => write!(f, "join"),
            SessionEvent::Complete => write!(f, "complete"),
            SessionEvent::Cancel => write!(f, "cancel"),
            SessionEvent::Fatal => write!(f, "fatal"),
        }
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Ai,
    System,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Ai => write!(f, "ai"),
            Speaker::System => write!(f, "system"),
        }
    }
}

/// One utterance in the conversation history.
///
/// `sequence` is assigned by the session and is strictly increasing and
/// gap-free within a session, starting at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
}

/// A turn that has not yet been assigned a sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTurn {
    pub speaker: Speaker,
    pub text: String,
    pub confidence: Option<f32>,
    pub emotion: Option<String>,
}

impl NewTurn {
    pub fn user(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
            confidence: Some(confidence),
            emotion: None,
        }
    }

    pub fn ai(text: impl Into<String>, confidence: f32, emotion: Option<String>) -> Self {
        Self {
            speaker: Speaker::Ai,
            text: text.into(),
            confidence: Some(confidence),
            emotion,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::System,
            text: text.into(),
            confidence: None,
            emotion: None,
        }
    }
}

/// Parameters for creating a session, after scenario resolution.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: String,
    pub scenario_id: String,
    pub profession: Profession,
    pub difficulty: Difficulty,
    pub scenario_type: String,
    pub persona: PersonaSnapshot,
    pub room_name: String,
}

/// A practice session between a learner and a simulated patient.
///
/// The persona is fixed at creation. Turns are only appended while the
/// session is active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: String,
    pub scenario_id: String,
    pub profession: Profession,
    pub difficulty: Difficulty,
    pub scenario_type: String,
    pub status: SessionStatus,
    pub room_name: String,
    pub persona: PersonaSnapshot,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub turns: Vec<Turn>,
}

impl Session {
    pub fn new(id: Uuid, params: NewSession, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: params.user_id,
            scenario_id: params.scenario_id,
            profession: params.profession,
            difficulty: params.difficulty,
            scenario_type: params.scenario_type,
            status: SessionStatus::Created,
            room_name: params.room_name,
            persona: params.persona,
            created_at: now,
            started_at: None,
            ended_at: None,
            turns: Vec::new(),
        }
    }

    /// Apply a lifecycle event, stamping `started_at` / `ended_at` as needed.
    pub fn apply(&mut self, event: SessionEvent, now: DateTime<Utc>) -> Result<SessionStatus, SessionError> {
        let next = self
            .status
            .next(event)
            .ok_or(SessionError::InvalidTransition {
                id: self.id,
                from: self.status,
                event,
            })?;
        if next == SessionStatus::Active {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.ended_at = Some(now);
        }
        self.status = next;
        Ok(next)
    }

    /// Append a turn, assigning the next sequence number.
    ///
    /// Fails with `NotActive` unless the session is active.
    pub fn append(&mut self, turn: NewTurn, now: DateTime<Utc>) -> Result<Turn, SessionError> {
        if self.status != SessionStatus::Active {
            return Err(SessionError::NotActive {
                id: self.id,
                status: self.status,
            });
        }
        let sequence = self.turns.last().map(|t| t.sequence + 1).unwrap_or(1);
        let turn = Turn {
            speaker: turn.speaker,
            text: turn.text,
            timestamp: now,
            sequence,
            confidence: turn.confidence,
            emotion: turn.emotion,
        };
        self.turns.push(turn.clone());
        Ok(turn)
    }

    /// Seconds between join and end (or `now` while still running).
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        match self.started_at {
            Some(start) => {
                let end = self.ended_at.unwrap_or(now);
                (end - start).num_seconds().max(0) as u64
            }
            None => 0,
        }
    }

    /// Render the conversation as labelled lines, oldest first.
    ///
    /// The learner is labelled by profession title, the patient by persona
    /// name. System turns are omitted.
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .filter_map(|turn| {
                let label = match turn.speaker {
                    Speaker::User => self.profession.title(),
                    Speaker::Ai => self.persona.name.as_str(),
                    Speaker::System => return None,
                };
                Some(format!("{label}: {}", turn.text))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session() -> Session {
        Session::new(
            Uuid::now_v7(),
            NewSession {
                user_id: "user-1".to_string(),
                scenario_id: "headache".to_string(),
                profession: Profession::Doctor,
                difficulty: Difficulty::Beginner,
                scenario_type: "consultation".to_string(),
                persona: PersonaSnapshot::default(),
                room_name: "session-1".to_string(),
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_state_machine_table() {
        use SessionEvent as E;
        use SessionStatus as S;
        assert_eq!(S::Created.next(E::Join), Some(S::Active));
        assert_eq!(S::Created.next(E::Cancel), Some(S::Cancelled));
        assert_eq!(S::Created.next(E::Complete), None);
        assert_eq!(S::Created.next(E::Fatal), Some(S::Error));
        assert_eq!(S::Active.next(E::Complete), Some(S::Completed));
        assert_eq!(S::Active.next(E::Cancel), Some(S::Cancelled));
        assert_eq!(S::Active.next(E::Fatal), Some(S::Error));
        assert_eq!(S::Active.next(E::Join), None);
        for terminal in [S::Completed, S::Cancelled, S::Error] {
            assert!(terminal.is_terminal());
            for event in [E::Join, E::Complete, E::Cancel, E::Fatal] {
                assert_eq!(terminal.next(event), None);
            }
        }
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            SessionStatus::Created,
            SessionStatus::Active,
            SessionStatus::Completed,
            SessionStatus::Cancelled,
            SessionStatus::Error,
        ] {
            let parsed: SessionStatus = status.to_string().parse().unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn test_apply_stamps_timestamps() {
        let mut session = sample_session();
        let now = Utc::now();
        session.apply(SessionEvent::Join, now).unwrap();
        assert_eq!(session.started_at, Some(now));
        assert!(session.ended_at.is_none());
        session.apply(SessionEvent::Complete, now).unwrap();
        assert_eq!(session.ended_at, Some(now));

        let err = session.apply(SessionEvent::Cancel, now).unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { .. }));
        assert_eq!(session.status, SessionStatus::Completed);
    }

    #[test]
    fn test_append_requires_active() {
        let mut session = sample_session();
        let err = session.append(NewTurn::user("hello", 0.9), Utc::now()).unwrap_err();
        assert!(matches!(err, SessionError::NotActive { .. }));
        assert!(session.turns.is_empty());
    }

    #[test]
    fn test_append_assigns_gap_free_sequence() {
        let mut session = sample_session();
        session.apply(SessionEvent::Join, Utc::now()).unwrap();
        let a = session.append(NewTurn::ai("Hello doctor", 0.9, None), Utc::now()).unwrap();
        let b = session.append(NewTurn::user("What brings you in?", 0.95), Utc::now()).unwrap();
        let c = session.append(NewTurn::system("[unable to transcribe]"), Utc::now()).unwrap();
        assert_eq!((a.sequence, b.sequence, c.sequence), (1, 2, 3));
    }

    #[test]
    fn test_transcript_labels() {
        let mut session = sample_session();
        session.apply(SessionEvent::Join, Utc::now()).unwrap();
        session.append(NewTurn::user("How are you feeling?", 0.9), Utc::now()).unwrap();
        session.append(NewTurn::system("note"), Utc::now()).unwrap();
        session.append(NewTurn::ai("Not great.", 0.8, None), Utc::now()).unwrap();
        assert_eq!(
            session.transcript(),
            "Doctor: How are you feeling?\nSarah Johnson: Not great."
        );
    }
}
