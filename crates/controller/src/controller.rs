use std::sync::Arc;
use std::time::{Duration, Instant};

use acr_core::{AcrError, AcrResult, ApplicationEvent, EventKind};
use acr_service::{Resolution, RevisionResolver};
use metrics::{counter, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broadcast::{Broadcaster, Subscription, DEFAULT_QUEUE_CAPACITY};

pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(120);

/// Counters for one `Controller::run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub received: u64,
    /// Deleted and Bookmark events.
    pub skipped: u64,
    /// Reconciliations that returned a resolution (including resolver-side skips).
    pub processed: u64,
    pub failed: u64,
    pub timed_out: u64,
}

pub struct Controller {
    broadcaster: Arc<Broadcaster>,
    resolver: Arc<dyn RevisionResolver>,
    use_annotations: bool,
    timeout: Duration,
    queue_capacity: usize,
}

impl Controller {
    pub fn new(broadcaster: Arc<Broadcaster>, resolver: Arc<dyn RevisionResolver>, use_annotations: bool) -> Self {
        Self {
            broadcaster,
            resolver,
            use_annotations,
            timeout: DEFAULT_RECONCILE_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Register the controller's queue. Events published from this point on
    /// are kept for `run`, so call it before starting the event source.
    pub fn subscribe(&self) -> Subscription {
        self.broadcaster.subscribe_with_capacity(self.queue_capacity)
    }

    /// Consume `sub` until `cancel` fires or the broadcaster goes away.
    ///
    /// Events are handled one at a time in arrival order. On cancellation an
    /// in-flight reconciliation is left to finish (or time out) on its own task.
    pub async fn run(&self, mut sub: Subscription, cancel: CancellationToken) -> ControllerStats {
        let mut stats = ControllerStats::default();
        info!(subscriber = sub.id(), use_annotations = self.use_annotations, timeout_ms = %self.timeout.as_millis(), "controller started");

        loop {
            let ev = tokio::select! {
                _ = cancel.cancelled() => break,
                ev = sub.recv() => match ev {
                    Some(ev) => ev,
                    None => {
                        warn!("event queue closed; stopping controller");
                        break;
                    }
                },
            };
            stats.received += 1;
            if !self.should_reconcile(&ev) {
                stats.skipped += 1;
                continue;
            }

            let key = ev.application.key();
            let t0 = Instant::now();
            let work = tokio::spawn(reconcile(self.resolver.clone(), ev, self.use_annotations, self.timeout));
            let joined = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(app = %key, "cancelled with reconciliation in flight");
                    break;
                }
                joined = work => joined,
            };
            histogram!("acr_reconcile_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);

            let outcome = match joined {
                Ok(Ok(resolution)) => {
                    stats.processed += 1;
                    debug!(app = %key, outcome = resolution.outcome(), took_ms = %t0.elapsed().as_millis(), "reconciled");
                    resolution.outcome()
                }
                Ok(Err(AcrError::Timeout(limit))) => {
                    stats.timed_out += 1;
                    error!(app = %key, limit_ms = %limit.as_millis(), "change revision reconciliation timed out");
                    "timeout"
                }
                Ok(Err(e)) => {
                    stats.failed += 1;
                    error!(app = %key, error = %e, kind = e.kind(), "failed to calculate change revision");
                    "error"
                }
                Err(e) => {
                    stats.failed += 1;
                    error!(app = %key, error = %e, "reconciliation task aborted");
                    "error"
                }
            };
            counter!("acr_reconcile_total", 1u64, "outcome" => outcome);
        }

        sub.unsubscribe();
        info!(?stats, "controller stopped");
        stats
    }

    fn should_reconcile(&self, ev: &ApplicationEvent) -> bool {
        match ev.kind {
            EventKind::Added | EventKind::Modified | EventKind::Error => true,
            EventKind::Deleted | EventKind::Bookmark => {
                debug!(app = %ev.application.key(), kind = ev.kind.as_str(), "event ignored");
                false
            }
        }
    }
}

async fn reconcile(
    resolver: Arc<dyn RevisionResolver>,
    ev: ApplicationEvent,
    use_annotations: bool,
    limit: Duration,
) -> AcrResult<Resolution> {
    match tokio::time::timeout(limit, resolver.change_revision(&ev.application, use_annotations)).await {
        Ok(res) => res,
        Err(_) => Err(AcrError::Timeout(limit)),
    }
}
