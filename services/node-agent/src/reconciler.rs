//! Event-driven reconciler feeding the pod worker manager.
//!
//! The reconciler:
//! - Receives desired-state change events from the watch transport
//! - Turns each event into exactly one pod worker manager call
//! - Retries back-pressure (`QueueFull`, `Draining`) with exponential backoff
//! - Holds later events for a pod while one of its events awaits a retry, so
//!   each pod still sees its events in arrival order
//! - Drops events that contradict the current worker table as stale
//! - Logs runtime failures reported through task tickets
//!
//! The event loop never waits on the runtime. Retries are scheduled on
//! timers and fed back into the loop.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use minik8s_id::PodUid;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::PodWorkerError;
use crate::pod::Pod;
use crate::worker::{PodWorkerManager, TaskTicket};

// =============================================================================
// Events
// =============================================================================

/// A desired-state change observed upstream of the node agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PodEvent {
    /// A pod was scheduled to this node.
    Added(Pod),
    /// A pod was removed from this node.
    Deleted(Pod),
    Start(Pod),
    Stop(Pod),
    Restart(Pod),
    /// The runtime saw the pod's containers disappear.
    ContainersGone { pod_uid: PodUid },
}

impl PodEvent {
    pub fn pod_uid(&self) -> &PodUid {
        match self {
            PodEvent::Added(pod)
            | PodEvent::Deleted(pod)
            | PodEvent::Start(pod)
            | PodEvent::Stop(pod)
            | PodEvent::Restart(pod) => pod.uid(),
            PodEvent::ContainersGone { pod_uid } => pod_uid,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            PodEvent::Added(_) => "added",
            PodEvent::Deleted(_) => "deleted",
            PodEvent::Start(_) => "start",
            PodEvent::Stop(_) => "stop",
            PodEvent::Restart(_) => "restart",
            PodEvent::ContainersGone { .. } => "containers_gone",
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Exponential backoff configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Base delay for first retry.
    pub base: Duration,

    /// Maximum delay.
    pub max: Duration,

    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(10),
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Calculate delay for the given attempt number (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = self.base.as_millis() as f64 * 2.0_f64.powi(attempt.min(31) as i32);
        let delay = delay.min(self.max.as_millis() as f64);

        let jitter = delay * self.jitter * jitter_unit();
        Duration::from_millis((delay + jitter).max(0.0) as u64)
    }
}

/// Pseudo-random value in `[-1.0, 1.0)` derived from the clock.
fn jitter_unit() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    let mixed = (nanos as u64)
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    ((mixed >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
}

/// Reconciler configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilerConfig {
    /// Attempts per event before giving up on back-pressure.
    pub max_attempts: u32,

    /// Delay between attempts.
    pub backoff: BackoffPolicy,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: BackoffPolicy::default(),
        }
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// Counters reported when the reconciler stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcilerStats {
    /// Events accepted by a pod worker.
    pub applied: u64,
    /// Retries scheduled after back-pressure.
    pub retried: u64,
    /// Events dropped as stale or after exhausting retries.
    pub dropped: u64,
}

#[derive(Debug)]
struct PendingEvent {
    event: PodEvent,
    attempt: u32,
}

/// Drives the pod worker manager from desired-state events.
pub struct Reconciler {
    manager: Arc<PodWorkerManager>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(manager: Arc<PodWorkerManager>, config: ReconcilerConfig) -> Self {
        Self { manager, config }
    }

    /// Run until shutdown, or until the event stream ends and no retries are
    /// outstanding.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<PodEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> ReconcilerStats {
        info!(
            max_attempts = self.config.max_attempts,
            "Starting pod event reconciler"
        );

        let (retry_tx, mut retry_rx) = mpsc::unbounded_channel::<PendingEvent>();
        let mut stats = ReconcilerStats::default();
        let mut events_open = true;
        let mut outstanding_retries: usize = 0;
        // Pods with a retry in flight, and the events that arrived behind it.
        let mut backlog: HashMap<PodUid, VecDeque<PendingEvent>> = HashMap::new();

        loop {
            if !events_open && outstanding_retries == 0 {
                info!("Event stream closed, reconciler exiting");
                break;
            }

            tokio::select! {
                event = events.recv(), if events_open => {
                    match event {
                        Some(event) => {
                            let pending = PendingEvent { event, attempt: 0 };
                            if let Some(held) = backlog.get_mut(pending.event.pod_uid()) {
                                debug!(
                                    pod_uid = %pending.event.pod_uid(),
                                    event = pending.event.name(),
                                    held = held.len() + 1,
                                    "Pod has a retry pending, holding event"
                                );
                                held.push_back(pending);
                            } else {
                                let pod_uid = pending.event.pod_uid().clone();
                                if self.dispatch(pending, &retry_tx, &mut stats).await {
                                    outstanding_retries += 1;
                                    backlog.insert(pod_uid, VecDeque::new());
                                }
                            }
                        }
                        None => events_open = false,
                    }
                }
                Some(pending) = retry_rx.recv() => {
                    outstanding_retries -= 1;
                    let pod_uid = pending.event.pod_uid().clone();
                    if self.dispatch(pending, &retry_tx, &mut stats).await
                        || self.replay_backlog(&pod_uid, &mut backlog, &retry_tx, &mut stats).await
                    {
                        outstanding_retries += 1;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let held: usize = backlog.values().map(VecDeque::len).sum();
                        info!(outstanding_retries, held, "Reconciler shutting down");
                        break;
                    }
                }
            }
        }

        info!(
            applied = stats.applied,
            retried = stats.retried,
            dropped = stats.dropped,
            "Reconciler stopped"
        );

        stats
    }

    /// Dispatch the events held behind a pod's settled retry, in arrival
    /// order. Stops at the first one that needs a retry of its own and
    /// returns true; otherwise releases the pod's backlog.
    async fn replay_backlog(
        &self,
        pod_uid: &PodUid,
        backlog: &mut HashMap<PodUid, VecDeque<PendingEvent>>,
        retry_tx: &mpsc::UnboundedSender<PendingEvent>,
        stats: &mut ReconcilerStats,
    ) -> bool {
        while let Some(pending) = backlog.get_mut(pod_uid).and_then(VecDeque::pop_front) {
            if self.dispatch(pending, retry_tx, stats).await {
                return true;
            }
        }
        backlog.remove(pod_uid);
        false
    }

    /// Apply one event. Returns true if a retry was scheduled.
    async fn dispatch(
        &self,
        pending: PendingEvent,
        retry_tx: &mpsc::UnboundedSender<PendingEvent>,
        stats: &mut ReconcilerStats,
    ) -> bool {
        let PendingEvent { event, attempt } = pending;

        let result = self.apply(&event).await;
        match result {
            Ok(ticket) => {
                stats.applied += 1;
                debug!(
                    pod_uid = %event.pod_uid(),
                    event = event.name(),
                    attempt,
                    "Event accepted"
                );
                watch_ticket(ticket);
                false
            }
            Err(e) if e.is_retryable() && attempt + 1 < self.config.max_attempts => {
                let delay = self.config.backoff.delay(attempt);
                stats.retried += 1;
                debug!(
                    pod_uid = %event.pod_uid(),
                    event = event.name(),
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %e,
                    "Back-pressure, scheduling retry"
                );

                let retry_tx = retry_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = retry_tx.send(PendingEvent {
                        event,
                        attempt: attempt + 1,
                    });
                });
                true
            }
            Err(e) => {
                stats.dropped += 1;
                warn!(
                    pod_uid = %event.pod_uid(),
                    event = event.name(),
                    attempt,
                    error = %e,
                    "Dropping pod event"
                );
                false
            }
        }
    }

    async fn apply(&self, event: &PodEvent) -> Result<TaskTicket, PodWorkerError> {
        match event {
            PodEvent::Added(pod) => self.manager.add_pod(pod.clone()).await,
            PodEvent::Deleted(pod) => self.manager.delete_pod(pod.clone()).await,
            PodEvent::Start(pod) => self.manager.start_pod(pod.clone()).await,
            PodEvent::Stop(pod) => self.manager.stop_pod(pod.clone()).await,
            PodEvent::Restart(pod) => self.manager.restart_pod(pod.clone()).await,
            PodEvent::ContainersGone { pod_uid } => self.manager.delete_pod_by_uid(pod_uid).await,
        }
    }
}

/// Log the outcome of an accepted task once the worker has run it.
fn watch_ticket(ticket: TaskTicket) {
    tokio::spawn(async move {
        let pod_uid = ticket.pod_uid().clone();
        let kind = ticket.kind();
        match ticket.wait().await {
            Ok(()) => debug!(pod_uid = %pod_uid, task = %kind, "Lifecycle task done"),
            Err(e) => warn!(
                pod_uid = %pod_uid,
                task = %kind,
                error = %e,
                "Lifecycle task failed, pod left for the next desired-state event"
            ),
        }
    });
}
