//! Single-pod actor that applies lifecycle tasks in submission order.

use std::sync::Arc;
use std::time::Instant;

use minik8s_id::PodUid;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::task::{PodTask, TaskKind};
use crate::error::PodWorkerError;
use crate::runtime::PodRuntime;

/// Queue capacity used when none is configured.
///
/// Large enough to absorb a short burst of churn for one pod, small enough
/// that a stuck runtime call pushes back on the caller quickly.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Pod worker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Maximum number of queued (not yet dispatched) tasks per pod.
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

type TaskOutcome = Result<(), PodWorkerError>;

struct QueuedTask {
    task: PodTask,
    done: oneshot::Sender<TaskOutcome>,
}

/// Counters reported when a worker's run loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub tasks_processed: u64,
    pub tasks_failed: u64,
}

/// Completion signal for a task accepted by a worker.
///
/// Dropping the ticket does not affect execution.
#[derive(Debug)]
#[must_use = "a ticket reports whether the runtime operation succeeded"]
pub struct TaskTicket {
    pod_uid: PodUid,
    kind: TaskKind,
    rx: oneshot::Receiver<TaskOutcome>,
}

impl TaskTicket {
    pub fn pod_uid(&self) -> &PodUid {
        &self.pod_uid
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Wait until the worker has run the task.
    ///
    /// Returns `RuntimeOperationFailed` if the runtime rejected the operation,
    /// or `WorkerStopped` if the worker died before reaching the task.
    pub async fn wait(self) -> Result<(), PodWorkerError> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(PodWorkerError::WorkerStopped {
                pod_uid: self.pod_uid,
            }),
        }
    }
}

/// Sending side of a pod worker's queue.
///
/// There is exactly one handle per worker; dropping it closes the queue and
/// lets the worker stop once everything already queued has run.
#[derive(Debug)]
pub struct PodWorkerHandle {
    pod_uid: PodUid,
    tx: mpsc::Sender<QueuedTask>,
}

impl PodWorkerHandle {
    /// Enqueue a task without waiting.
    pub fn submit(&self, task: PodTask) -> Result<TaskTicket, PodWorkerError> {
        debug_assert_eq!(task.pod_uid(), &self.pod_uid, "task routed to wrong worker");

        let kind = task.kind();
        let (done, rx) = oneshot::channel();

        self.tx
            .try_send(QueuedTask { task, done })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => PodWorkerError::QueueFull {
                    pod_uid: self.pod_uid.clone(),
                    capacity: self.capacity(),
                },
                mpsc::error::TrySendError::Closed(_) => PodWorkerError::WorkerStopped {
                    pod_uid: self.pod_uid.clone(),
                },
            })?;

        debug!(pod_uid = %self.pod_uid, task = %kind, queued = self.queued(), "Task queued");

        Ok(TaskTicket {
            pod_uid: self.pod_uid.clone(),
            kind,
            rx,
        })
    }

    pub fn pod_uid(&self) -> &PodUid {
        &self.pod_uid
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Tasks waiting in the queue, excluding one being executed.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// True once the worker's run loop has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Actor applying lifecycle tasks for a single pod.
pub struct PodWorker {
    pod_uid: PodUid,
    runtime: Arc<dyn PodRuntime>,
    rx: mpsc::Receiver<QueuedTask>,
}

impl PodWorker {
    /// Create a worker with an empty queue and its handle.
    ///
    /// A zero `capacity` is treated as one.
    pub fn new(
        pod_uid: PodUid,
        runtime: Arc<dyn PodRuntime>,
        capacity: usize,
    ) -> (Self, PodWorkerHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = Self {
            pod_uid: pod_uid.clone(),
            runtime,
            rx,
        };
        (worker, PodWorkerHandle { pod_uid, tx })
    }

    /// Run tasks until the queue is closed and drained.
    ///
    /// Runtime failures are logged and reported through the task's ticket;
    /// they never stop the loop.
    pub async fn run(mut self) -> WorkerSummary {
        debug!(pod_uid = %self.pod_uid, "Pod worker started");

        let mut summary = WorkerSummary::default();

        while let Some(QueuedTask { task, done }) = self.rx.recv().await {
            let kind = task.kind();
            let started = Instant::now();

            let outcome = match self.dispatch(&task).await {
                Ok(()) => {
                    debug!(
                        pod_uid = %self.pod_uid,
                        task = %kind,
                        elapsed_ms = started.elapsed().as_millis(),
                        "Task completed"
                    );
                    Ok(())
                }
                Err(e) => {
                    summary.tasks_failed += 1;
                    warn!(
                        pod_uid = %self.pod_uid,
                        task = %kind,
                        error = %e,
                        "Runtime operation failed"
                    );
                    Err(PodWorkerError::RuntimeOperationFailed {
                        pod_uid: self.pod_uid.clone(),
                        kind,
                        message: format!("{e:#}"),
                    })
                }
            };
            summary.tasks_processed += 1;

            // The submitter may have dropped its ticket.
            let _ = done.send(outcome);
        }

        info!(
            pod_uid = %self.pod_uid,
            tasks_processed = summary.tasks_processed,
            tasks_failed = summary.tasks_failed,
            "Pod worker drained"
        );

        summary
    }

    async fn dispatch(&self, task: &PodTask) -> anyhow::Result<()> {
        match task {
            PodTask::Add(pod) => self.runtime.create_pod(pod).await,
            PodTask::Delete(pod) => self.runtime.delete_pod(pod).await,
            PodTask::Start(pod) => self.runtime.start_pod(pod).await,
            PodTask::Stop(pod) => self.runtime.stop_pod(pod).await,
            PodTask::Restart(pod) => self.runtime.restart_pod(pod).await,
            PodTask::DeleteByUid(pod_uid) => self.runtime.delete_pod_by_uid(pod_uid).await,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
