//! Background expiry of stale sessions.
//!
//! Sessions that are not `active` and older than the TTL are evicted and
//! their rooms released. Active sessions are never reaped, whatever their age.
//! Tombstones of evicted sessions age out on the same TTL.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::lifecycle::SessionLifecycle;
use super::registry::SessionRegistry;

pub struct SessionReaper {
    registry: Arc<SessionRegistry>,
    lifecycle: Arc<SessionLifecycle>,
    ttl: Duration,
    interval: Duration,
}

impl SessionReaper {
    pub fn new(
        registry: Arc<SessionRegistry>,
        lifecycle: Arc<SessionLifecycle>,
        ttl: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            lifecycle,
            ttl,
            interval,
        }
    }

    /// Run one sweep as of `now`. Returns the number of sessions reaped.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let expired = self.registry.expired(self.ttl, now).await;
        for id in &expired {
            self.lifecycle.expire(*id).await;
        }
        let pruned = self.registry.prune_tombstones(self.ttl, now);
        if !expired.is_empty() || pruned > 0 {
            info!(count = expired.len(), pruned, remaining = self.registry.len(), "reaper sweep");
        }
        expired.len()
    }

    /// Sweep on a fixed interval until `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("session reaper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.sweep(Utc::now()).await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockGateways, harness};
    use bedside_types::session::SessionStatus;

    fn reaper(h: &crate::testing::Harness) -> SessionReaper {
        SessionReaper::new(
            Arc::clone(h.orchestrator.registry()),
            Arc::clone(h.orchestrator.lifecycle()),
            Duration::from_secs(24 * 3600),
            Duration::from_secs(300),
        )
    }

    #[tokio::test]
    async fn test_sweep_reaps_idle_created_session_and_releases_room() {
        let h = harness(MockGateways::default());
        let ticket = h.create_session().await;
        let reaper = reaper(&h);

        assert_eq!(reaper.sweep(Utc::now()).await, 0);
        let later = Utc::now() + chrono::Duration::hours(25);
        assert_eq!(reaper.sweep(later).await, 1);
        assert!(h.orchestrator.registry().get(ticket.session_id).await.is_err());
        assert_eq!(h.probes.released(), vec![ticket.room_name]);
    }

    #[tokio::test]
    async fn test_sweep_never_reaps_active_session() {
        let h = harness(MockGateways::default());
        let ticket = h.create_session().await;
        h.orchestrator.lifecycle().join(ticket.session_id).await.unwrap();

        let much_later = Utc::now() + chrono::Duration::days(30);
        assert_eq!(reaper(&h).sweep(much_later).await, 0);
        let status = h.orchestrator.registry().status(ticket.session_id).await.unwrap();
        assert_eq!(status, SessionStatus::Active);
        assert!(h.probes.released().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_reaps_errored_session_once() {
        let h = harness(MockGateways::default());
        let ticket = h.create_session().await;
        h.orchestrator.lifecycle().join(ticket.session_id).await.unwrap();
        h.orchestrator.lifecycle().fail(ticket.session_id, "test").await;

        let later = Utc::now() + chrono::Duration::hours(25);
        assert_eq!(reaper(&h).sweep(later).await, 1);
        // Room was already released by the fatal path.
        assert_eq!(h.probes.released().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_prunes_old_tombstones() {
        let h = harness(MockGateways::default());
        let ticket = h.create_session().await;
        let id = ticket.session_id;
        h.orchestrator.cancel_session(id).await.unwrap();
        let registry = h.orchestrator.registry();
        assert_eq!(registry.closed_status(id), Some(SessionStatus::Cancelled));

        let reaper = reaper(&h);
        reaper.sweep(Utc::now() + chrono::Duration::hours(1)).await;
        assert_eq!(registry.closed_status(id), Some(SessionStatus::Cancelled));
        reaper.sweep(Utc::now() + chrono::Duration::hours(25)).await;
        assert_eq!(registry.closed_status(id), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_reaper_stops_on_shutdown() {
        let h = harness(MockGateways::default());
        let shutdown = CancellationToken::new();
        let handle = reaper(&h).spawn(shutdown.clone());
        tokio::time::sleep(Duration::from_secs(601)).await;
        shutdown.cancel();
        handle.await.unwrap();
    }
}
