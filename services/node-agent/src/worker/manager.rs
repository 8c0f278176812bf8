//! Routing table from pod identity to pod worker.
//!
//! The manager is the only writer of the table. Every read and write goes
//! through one async mutex, so concurrent `add_pod`/`delete_pod` calls for the
//! same pod are serialized and at most one worker ever exists per pod. The
//! lock is never held across runtime work: submissions are non-blocking.

use std::collections::HashMap;
use std::sync::Arc;

use minik8s_id::PodUid;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info};

use super::pod_worker::{PodWorker, PodWorkerHandle, TaskTicket, WorkerConfig};
use super::task::PodTask;
use crate::error::PodWorkerError;
use crate::pod::Pod;
use crate::runtime::PodRuntime;

/// Routing state of a registered pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    /// Accepting lifecycle tasks.
    Active,
    /// A delete was accepted; the worker is finishing its queue and will
    /// then be removed.
    Draining,
}

struct WorkerSlot {
    /// `None` once the queue has been closed.
    handle: Option<PodWorkerHandle>,
    /// Flips to `true` when the worker has stopped and the slot is gone.
    retired: watch::Receiver<bool>,
}

impl WorkerSlot {
    fn phase(&self) -> WorkerPhase {
        if self.handle.is_some() {
            WorkerPhase::Active
        } else {
            WorkerPhase::Draining
        }
    }
}

type WorkerTable = HashMap<PodUid, WorkerSlot>;

/// Directory and router for pod workers.
pub struct PodWorkerManager {
    /// Runtime shared by all workers.
    runtime: Arc<dyn PodRuntime>,

    config: WorkerConfig,

    /// Registered workers by pod uid.
    workers: Arc<Mutex<WorkerTable>>,
}

impl PodWorkerManager {
    /// Create a manager with no workers.
    pub fn new(runtime: Arc<dyn PodRuntime>, config: WorkerConfig) -> Self {
        Self {
            runtime,
            config,
            workers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start managing `pod`: spawn its worker and queue the create.
    ///
    /// Fails with `AlreadyExists` if the pod has an active worker, or with
    /// `Draining` if its previous worker has not finished retiring yet.
    pub async fn add_pod(&self, pod: impl Into<Arc<Pod>>) -> Result<TaskTicket, PodWorkerError> {
        let pod = pod.into();
        let pod_uid = pod.uid().clone();

        let mut workers = self.workers.lock().await;

        if let Some(slot) = workers.get(&pod_uid) {
            return Err(match slot.phase() {
                WorkerPhase::Active => PodWorkerError::AlreadyExists { pod_uid },
                WorkerPhase::Draining => PodWorkerError::Draining { pod_uid },
            });
        }

        let (worker, handle) = PodWorker::new(
            pod_uid.clone(),
            Arc::clone(&self.runtime),
            self.config.queue_capacity,
        );

        // The queue is empty, so this only fails if the worker is unusable;
        // in that case nothing gets registered.
        let ticket = handle.submit(PodTask::Add(Arc::clone(&pod)))?;

        let (retired_tx, retired_rx) = watch::channel(false);
        workers.insert(
            pod_uid.clone(),
            WorkerSlot {
                handle: Some(handle),
                retired: retired_rx,
            },
        );
        self.spawn_worker(worker, pod_uid.clone(), retired_tx);

        info!(
            pod_uid = %pod_uid,
            pod = %pod.qualified_name(),
            workers = workers.len(),
            "Pod worker registered"
        );

        Ok(ticket)
    }

    /// Queue a delete and retire the pod's worker once it has run.
    ///
    /// The pod is `Draining` from the moment the delete is accepted until the
    /// worker has drained its queue; see [`PodWorkerManager::wait_absent`].
    pub async fn delete_pod(&self, pod: impl Into<Arc<Pod>>) -> Result<TaskTicket, PodWorkerError> {
        let pod = pod.into();
        let pod_uid = pod.uid().clone();
        self.submit_and_retire(&pod_uid, PodTask::Delete(pod)).await
    }

    pub async fn start_pod(&self, pod: impl Into<Arc<Pod>>) -> Result<TaskTicket, PodWorkerError> {
        let pod = pod.into();
        let pod_uid = pod.uid().clone();
        self.submit(&pod_uid, PodTask::Start(pod)).await
    }

    pub async fn stop_pod(&self, pod: impl Into<Arc<Pod>>) -> Result<TaskTicket, PodWorkerError> {
        let pod = pod.into();
        let pod_uid = pod.uid().clone();
        self.submit(&pod_uid, PodTask::Stop(pod)).await
    }

    pub async fn restart_pod(
        &self,
        pod: impl Into<Arc<Pod>>,
    ) -> Result<TaskTicket, PodWorkerError> {
        let pod = pod.into();
        let pod_uid = pod.uid().clone();
        self.submit(&pod_uid, PodTask::Restart(pod)).await
    }

    /// Delete a pod known only by identity and retire its worker.
    ///
    /// Used when the runtime reports a pod's containers gone rather than the
    /// control plane asking for a delete.
    ///
    /// The worker is retired exactly as for [`PodWorkerManager::delete_pod`]:
    /// later `start_pod`, `stop_pod` and `restart_pod` calls return
    /// [`PodWorkerError::Draining`] and then [`PodWorkerError::NotFound`]
    /// until the pod is added again.
    pub async fn delete_pod_by_uid(&self, pod_uid: &PodUid) -> Result<TaskTicket, PodWorkerError> {
        self.submit_and_retire(pod_uid, PodTask::DeleteByUid(pod_uid.clone()))
            .await
    }

    /// Routing state of `pod_uid`, `None` if absent.
    pub async fn phase(&self, pod_uid: &PodUid) -> Option<WorkerPhase> {
        self.workers.lock().await.get(pod_uid).map(WorkerSlot::phase)
    }

    /// Number of tasks waiting in the pod's queue, if it is active.
    pub async fn queued(&self, pod_uid: &PodUid) -> Option<usize> {
        self.workers
            .lock()
            .await
            .get(pod_uid)
            .and_then(|slot| slot.handle.as_ref())
            .map(PodWorkerHandle::queued)
    }

    /// Uids of all registered pods, draining ones included, sorted.
    pub async fn pod_uids(&self) -> Vec<PodUid> {
        let mut uids: Vec<_> = self.workers.lock().await.keys().cloned().collect();
        uids.sort();
        uids
    }

    /// Number of registered workers, draining ones included.
    pub async fn len(&self) -> usize {
        self.workers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workers.lock().await.is_empty()
    }

    /// Wait until `pod_uid` has no worker.
    ///
    /// Returns immediately if it is absent. Never returns for a pod that stays
    /// active.
    pub async fn wait_absent(&self, pod_uid: &PodUid) {
        let retired = self
            .workers
            .lock()
            .await
            .get(pod_uid)
            .map(|slot| slot.retired.clone());

        if let Some(mut retired) = retired {
            // The sender always publishes `true` before it is dropped.
            let _ = retired.wait_for(|done| *done).await;
        }
    }

    /// Close every worker's queue and wait for all of them to drain.
    ///
    /// Tasks already queued still run. Pods may be added again afterwards.
    pub async fn shutdown(&self) {
        let pending: Vec<_> = {
            let mut workers = self.workers.lock().await;
            workers
                .values_mut()
                .map(|slot| {
                    slot.handle = None;
                    slot.retired.clone()
                })
                .collect()
        };

        info!(count = pending.len(), "Draining all pod workers");

        for mut retired in pending {
            let _ = retired.wait_for(|done| *done).await;
        }

        info!("All pod workers drained");
    }

    // -------------------------------------------------------------------------
    // Internal
    // -------------------------------------------------------------------------

    async fn submit(&self, pod_uid: &PodUid, task: PodTask) -> Result<TaskTicket, PodWorkerError> {
        let workers = self.workers.lock().await;
        active_handle(&workers, pod_uid)?.submit(task)
    }

    async fn submit_and_retire(
        &self,
        pod_uid: &PodUid,
        task: PodTask,
    ) -> Result<TaskTicket, PodWorkerError> {
        debug_assert!(task.kind().is_delete());

        let mut workers = self.workers.lock().await;
        let ticket = active_handle(&workers, pod_uid)?.submit(task)?;

        // Dropping the only handle closes the queue behind the delete.
        if let Some(slot) = workers.get_mut(pod_uid) {
            slot.handle = None;
        }

        info!(pod_uid = %pod_uid, task = %ticket.kind(), "Pod worker draining");

        Ok(ticket)
    }

    fn spawn_worker(&self, worker: PodWorker, pod_uid: PodUid, retired: watch::Sender<bool>) {
        let workers = Arc::clone(&self.workers);
        let run = tokio::spawn(worker.run());

        tokio::spawn(async move {
            match run.await {
                Ok(summary) => {
                    debug!(
                        pod_uid = %pod_uid,
                        tasks_processed = summary.tasks_processed,
                        "Pod worker run loop finished"
                    );
                }
                Err(e) => {
                    error!(pod_uid = %pod_uid, error = %e, "Pod worker task failed");
                }
            }

            workers.lock().await.remove(&pod_uid);
            let _ = retired.send(true);

            info!(pod_uid = %pod_uid, "Pod worker retired");
        });
    }
}

fn active_handle<'a>(
    workers: &'a WorkerTable,
    pod_uid: &PodUid,
) -> Result<&'a PodWorkerHandle, PodWorkerError> {
    let slot = workers.get(pod_uid).ok_or_else(|| PodWorkerError::NotFound {
        pod_uid: pod_uid.clone(),
    })?;

    slot.handle.as_ref().ok_or_else(|| PodWorkerError::Draining {
        pod_uid: pod_uid.clone(),
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use crate::worker::TaskKind;

    fn test_pod(uid: &str) -> Pod {
        Pod::new(PodUid::parse(uid).unwrap(), "web")
    }

    fn manager(runtime: Arc<MockRuntime>) -> PodWorkerManager {
        PodWorkerManager::new(runtime, WorkerConfig::default())
    }

    #[tokio::test]
    async fn test_add_pod_registers_worker() {
        let runtime = Arc::new(MockRuntime::new());
        let manager = manager(runtime.clone());
        let pod = test_pod("p1");

        manager.add_pod(pod.clone()).await.unwrap().wait().await.unwrap();

        assert_eq!(manager.phase(pod.uid()).await, Some(WorkerPhase::Active));
        assert_eq!(manager.pod_uids().await, vec![pod.uid().clone()]);
        assert_eq!(runtime.calls_for(pod.uid()).await, vec![TaskKind::Add]);
    }

    #[tokio::test]
    async fn test_add_pod_twice_rejected() {
        let runtime = Arc::new(MockRuntime::new());
        let manager = manager(runtime.clone());
        let pod = test_pod("p1");

        manager.add_pod(pod.clone()).await.unwrap().wait().await.unwrap();
        let err = manager.add_pod(pod.clone()).await.unwrap_err();

        assert_eq!(
            err,
            PodWorkerError::AlreadyExists {
                pod_uid: pod.uid().clone()
            }
        );
        assert_eq!(runtime.calls_for(pod.uid()).await, vec![TaskKind::Add]);
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_pod_not_found() {
        let runtime = Arc::new(MockRuntime::new());
        let manager = manager(runtime.clone());
        let pod = test_pod("ghost");

        assert!(matches!(
            manager.start_pod(pod.clone()).await,
            Err(PodWorkerError::NotFound { .. })
        ));
        assert!(matches!(
            manager.delete_pod_by_uid(pod.uid()).await,
            Err(PodWorkerError::NotFound { .. })
        ));
        assert!(manager.is_empty().await);
        assert!(runtime.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_drains_then_retires() {
        let runtime = Arc::new(MockRuntime::new());
        let manager = manager(runtime.clone());
        let pod = test_pod("p1");

        let _ = manager.add_pod(pod.clone()).await.unwrap();
        let delete = manager.delete_pod(pod.clone()).await.unwrap();

        // Whatever the worker's progress, the pod is either still draining or
        // already gone; it is never active again.
        assert_ne!(manager.phase(pod.uid()).await, Some(WorkerPhase::Active));
        assert!(matches!(
            manager.stop_pod(pod.clone()).await,
            Err(PodWorkerError::Draining { .. } | PodWorkerError::NotFound { .. })
        ));

        delete.wait().await.unwrap();
        manager.wait_absent(pod.uid()).await;

        assert_eq!(manager.phase(pod.uid()).await, None);
        assert_eq!(
            runtime.calls_for(pod.uid()).await,
            vec![TaskKind::Add, TaskKind::Delete]
        );

        // A fresh worker can be created once the old one is gone.
        manager.add_pod(pod.clone()).await.unwrap().wait().await.unwrap();
        assert_eq!(manager.phase(pod.uid()).await, Some(WorkerPhase::Active));
    }

    #[tokio::test]
    async fn test_delete_by_uid_retires_worker() {
        let runtime = Arc::new(MockRuntime::new());
        let manager = manager(runtime.clone());
        let pod = test_pod("p1");

        let _ = manager.add_pod(pod.clone()).await.unwrap();
        manager
            .delete_pod_by_uid(pod.uid())
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();
        manager.wait_absent(pod.uid()).await;

        assert!(manager.is_empty().await);
        assert!(matches!(
            manager.start_pod(pod.clone()).await,
            Err(PodWorkerError::NotFound { .. })
        ));
        assert_eq!(
            runtime.calls_for(pod.uid()).await,
            vec![TaskKind::Add, TaskKind::DeleteByUid]
        );

        manager.add_pod(pod.clone()).await.unwrap().wait().await.unwrap();
        assert_eq!(manager.phase(pod.uid()).await, Some(WorkerPhase::Active));
    }

    #[tokio::test]
    async fn test_runtime_failure_keeps_worker_active() {
        let runtime = Arc::new(MockRuntime::new().failing_on(TaskKind::Restart));
        let manager = manager(runtime.clone());
        let pod = test_pod("p1");

        manager.add_pod(pod.clone()).await.unwrap().wait().await.unwrap();
        let err = manager
            .restart_pod(pod.clone())
            .await
            .unwrap()
            .wait()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PodWorkerError::RuntimeOperationFailed { kind: TaskKind::Restart, .. }
        ));
        assert_eq!(manager.phase(pod.uid()).await, Some(WorkerPhase::Active));
        manager.stop_pod(pod).await.unwrap().wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_drains_everything() {
        let runtime = Arc::new(MockRuntime::new().with_delay(std::time::Duration::from_millis(5)));
        let manager = manager(runtime.clone());

        for uid in ["p1", "p2", "p3"] {
            let pod = test_pod(uid);
            let _ = manager.add_pod(pod.clone()).await.unwrap();
            let _ = manager.stop_pod(pod.clone()).await.unwrap();
            let _ = manager.start_pod(pod).await.unwrap();
        }

        manager.shutdown().await;

        assert!(manager.is_empty().await);
        assert_eq!(runtime.calls().await.len(), 9);
        for uid in ["p1", "p2", "p3"] {
            assert_eq!(
                runtime.calls_for(&PodUid::parse(uid).unwrap()).await,
                vec![TaskKind::Add, TaskKind::Stop, TaskKind::Start]
            );
        }
    }
}
