//! Per-session turn queue.
//!
//! Each session gets one worker task fed by a bounded channel. The worker
//! runs jobs one at a time, so turns never interleave. A full queue rejects
//! the job with `QueueFull` instead of dropping or running it concurrently.
//!
//! Each job runs in its own task so a panic is contained and turned into a
//! fatal session error.
//!
//! Every worker publishes its count of queued plus running jobs on a watch
//! channel, so completion can wait for the last utterance to be answered.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{mpsc, watch};
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use bedside_types::error::SessionError;
use bedside_types::session::SessionStatus;

use super::turn::{TurnJob, TurnPipeline};
use crate::session::{SessionLifecycle, SessionRegistry};

#[derive(Clone)]
struct Worker {
    tx: mpsc::Sender<TurnJob>,
    pending: Arc<watch::Sender<usize>>,
}

impl Worker {
    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct TurnQueue {
    registry: Arc<SessionRegistry>,
    pipeline: Arc<TurnPipeline>,
    lifecycle: Arc<SessionLifecycle>,
    workers: Arc<DashMap<Uuid, Worker>>,
    depth: usize,
}

impl TurnQueue {
    pub fn new(
        registry: Arc<SessionRegistry>,
        pipeline: Arc<TurnPipeline>,
        lifecycle: Arc<SessionLifecycle>,
        depth: usize,
    ) -> Self {
        Self {
            registry,
            pipeline,
            lifecycle,
            workers: Arc::new(DashMap::new()),
            depth: depth.max(1),
        }
    }

    /// Enqueue a job for an active session, starting its worker if needed.
    pub async fn submit(&self, session_id: Uuid, job: TurnJob) -> Result<(), SessionError> {
        let status = self.registry.status(session_id).await?;
        if status != SessionStatus::Active {
            return Err(SessionError::NotActive {
                id: session_id,
                status,
            });
        }
        let cancel = self.registry.cancellation(session_id)?;

        let worker = match self.workers.entry(session_id) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_closed() {
                    entry.insert(self.spawn_worker(session_id, cancel));
                }
                entry.get().clone()
            }
            Entry::Vacant(entry) => entry.insert(self.spawn_worker(session_id, cancel)).clone(),
        };

        let kind = job.kind();
        worker.pending.send_modify(|n| *n += 1);
        worker.tx.try_send(job).map_err(|e| {
            worker.pending.send_modify(|n| *n = n.saturating_sub(1));
            match e {
                TrySendError::Full(_) => {
                    warn!(%session_id, kind, depth = self.depth, "turn queue full");
                    SessionError::QueueFull(session_id)
                }
                TrySendError::Closed(_) => SessionError::NotActive {
                    id: session_id,
                    status,
                },
            }
        })?;
        debug!(%session_id, kind, "turn queued");
        Ok(())
    }

    /// Wait until the session has no queued or running turn, for at most
    /// `limit`. Returns `false` if the limit elapsed first.
    pub async fn drain(&self, session_id: Uuid, limit: Duration) -> bool {
        let Some(mut pending) = self
            .workers
            .get(&session_id)
            .map(|w| w.pending.subscribe())
        else {
            return true;
        };
        let drained = tokio::time::timeout(limit, pending.wait_for(|n| *n == 0))
            .await
            .is_ok();
        if !drained {
            let left = *pending.borrow();
            warn!(%session_id, pending = left, "turn queue did not drain in time");
        }
        drained
    }

    /// Number of sessions with a live worker.
    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    fn spawn_worker(&self, session_id: Uuid, cancel: CancellationToken) -> Worker {
        let (tx, rx) = mpsc::channel(self.depth);
        let (pending, _) = watch::channel(0usize);
        let pending = Arc::new(pending);
        tokio::spawn(run_worker(
            session_id,
            rx,
            cancel,
            Arc::clone(&pending),
            Arc::clone(&self.pipeline),
            Arc::clone(&self.lifecycle),
            Arc::clone(&self.workers),
        ));
        Worker { tx, pending }
    }
}

async fn run_worker(
    session_id: Uuid,
    mut rx: mpsc::Receiver<TurnJob>,
    cancel: CancellationToken,
    pending: Arc<watch::Sender<usize>>,
    pipeline: Arc<TurnPipeline>,
    lifecycle: Arc<SessionLifecycle>,
    workers: Arc<DashMap<Uuid, Worker>>,
) {
    debug!(%session_id, "turn worker started");
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let task = tokio::spawn({
            let pipeline = Arc::clone(&pipeline);
            let cancel = cancel.clone();
            async move { pipeline.execute(session_id, job, cancel).await }
        });
        let outcome = task.await;
        pending.send_modify(|n| *n = n.saturating_sub(1));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(SessionError::Fatal { reason, .. })) => {
                lifecycle.fail(session_id, &reason).await;
                break;
            }
            Ok(Err(e)) => debug!(%session_id, error = %e, "turn ended early"),
            Err(e) if e.is_panic() => {
                lifecycle.fail(session_id, "turn pipeline panicked").await;
                break;
            }
            Err(e) => warn!(%session_id, error = %e, "turn task aborted"),
        }
    }
    rx.close();
    // Jobs left in the channel will never run.
    pending.send_replace(0);
    workers.remove_if(&session_id, |_, w| w.is_closed());
    debug!(%session_id, "turn worker stopped");
}
