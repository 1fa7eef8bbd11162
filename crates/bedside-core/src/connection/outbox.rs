//! Per-session outbound stream: sequence allocation, replay log, subscribers.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use bedside_types::protocol::{Envelope, ServerEvent};

pub(crate) struct SessionOutbox {
    next_seq: u64,
    replay: VecDeque<Arc<Envelope>>,
    subscribers: Vec<(Uuid, mpsc::Sender<Arc<Envelope>>)>,
}

impl SessionOutbox {
    pub(crate) fn new() -> Self {
        Self {
            next_seq: 1,
            replay: VecDeque::new(),
            subscribers: Vec::new(),
        }
    }

    /// Highest sequence number published so far, 0 if none.
    pub(crate) fn last_seq(&self) -> u64 {
        self.next_seq - 1
    }

    /// Sequence, log, and fan out one event. Returns the assigned sequence
    /// number and the connections dropped because their channel was full or
    /// closed.
    pub(crate) fn publish(
        &mut self,
        session_id: Uuid,
        event: ServerEvent,
        replay_capacity: usize,
    ) -> (u64, Vec<Uuid>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let envelope = Arc::new(event.into_envelope(Some(session_id), Some(seq)));

        if replay_capacity > 0 {
            if self.replay.len() == replay_capacity {
                self.replay.pop_front();
            }
            self.replay.push_back(Arc::clone(&envelope));
        }

        let mut dropped = Vec::new();
        self.subscribers.retain(|(conn, tx)| match tx.try_send(Arc::clone(&envelope)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                dropped.push(*conn);
                false
            }
        });
        (seq, dropped)
    }

    /// Buffered envelopes with `seq > after`, oldest first.
    pub(crate) fn replay_after(&self, after: u64) -> impl Iterator<Item = &Arc<Envelope>> {
        self.replay
            .iter()
            .filter(move |e| e.seq.is_some_and(|s| s > after))
    }

    pub(crate) fn subscribe(&mut self, conn: Uuid, tx: mpsc::Sender<Arc<Envelope>>) {
        self.unsubscribe(conn);
        self.subscribers.push((conn, tx));
    }

    pub(crate) fn unsubscribe(&mut self, conn: Uuid) {
        self.subscribers.retain(|(c, _)| *c != conn);
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
