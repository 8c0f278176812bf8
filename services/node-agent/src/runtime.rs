//! Container runtime interface and mock implementation.
//!
//! The runtime interface abstracts the imperative pod operations:
//! - Creating/deleting the containers of a pod
//! - Starting/stopping/restarting those containers
//! - Deleting a pod known only by its identity (runtime-observed removal)
//!
//! A mock implementation is provided for testing and development.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use minik8s_id::PodUid;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::pod::Pod;
use crate::worker::TaskKind;

/// Container runtime interface.
///
/// Shared by every pod worker, so implementations must tolerate concurrent
/// calls for different pods.
#[async_trait]
pub trait PodRuntime: Send + Sync {
    /// Create (and launch) the containers described by `pod`.
    async fn create_pod(&self, pod: &Pod) -> Result<()>;

    /// Stop and remove the containers of `pod`.
    async fn delete_pod(&self, pod: &Pod) -> Result<()>;

    /// Start the already-created containers of `pod`.
    async fn start_pod(&self, pod: &Pod) -> Result<()>;

    /// Stop the containers of `pod` without removing them.
    async fn stop_pod(&self, pod: &Pod) -> Result<()>;

    /// Restart the containers of `pod`.
    async fn restart_pod(&self, pod: &Pod) -> Result<()>;

    /// Remove whatever is left of a pod known only by identity.
    async fn delete_pod_by_uid(&self, pod_uid: &PodUid) -> Result<()>;
}

/// A runtime operation as observed by [`MockRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCall {
    pub kind: TaskKind,
    pub pod_uid: PodUid,
}

/// Mock runtime for testing and development.
pub struct MockRuntime {
    /// Simulated duration of every operation.
    delay: Duration,

    /// Operations that should "fail".
    fail_on: HashSet<TaskKind>,

    /// Completed calls in completion order.
    calls: Mutex<Vec<RuntimeCall>>,
}

impl MockRuntime {
    /// Create a new mock runtime.
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            fail_on: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock runtime that fails every operation.
    pub fn failing() -> Self {
        Self::new()
            .failing_on(TaskKind::Add)
            .failing_on(TaskKind::Delete)
            .failing_on(TaskKind::Start)
            .failing_on(TaskKind::Stop)
            .failing_on(TaskKind::Restart)
            .failing_on(TaskKind::DeleteByUid)
    }

    /// Make operations of `kind` fail.
    pub fn failing_on(mut self, kind: TaskKind) -> Self {
        self.fail_on.insert(kind);
        self
    }

    /// Simulate `delay` of runtime work per operation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Calls observed so far, failed ones included.
    pub async fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().await.clone()
    }

    /// Calls observed so far for a single pod.
    pub async fn calls_for(&self, pod_uid: &PodUid) -> Vec<TaskKind> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| &call.pod_uid == pod_uid)
            .map(|call| call.kind)
            .collect()
    }

    async fn perform(&self, kind: TaskKind, pod_uid: &PodUid) -> Result<()> {
        info!(pod_uid = %pod_uid, operation = %kind, "[MOCK] Runtime operation");

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.calls.lock().await.push(RuntimeCall {
            kind,
            pod_uid: pod_uid.clone(),
        });

        if self.fail_on.contains(&kind) {
            anyhow::bail!("Mock runtime configured to fail {kind}");
        }

        debug!(pod_uid = %pod_uid, operation = %kind, "[MOCK] Runtime operation done");
        Ok(())
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PodRuntime for MockRuntime {
    async fn create_pod(&self, pod: &Pod) -> Result<()> {
        debug!(
            pod = %pod.qualified_name(),
            containers = pod.spec.containers.len(),
            "[MOCK] Creating pod"
        );
        self.perform(TaskKind::Add, pod.uid()).await
    }

    async fn delete_pod(&self, pod: &Pod) -> Result<()> {
        self.perform(TaskKind::Delete, pod.uid()).await
    }

    async fn start_pod(&self, pod: &Pod) -> Result<()> {
        self.perform(TaskKind::Start, pod.uid()).await
    }

    async fn stop_pod(&self, pod: &Pod) -> Result<()> {
        self.perform(TaskKind::Stop, pod.uid()).await
    }

    async fn restart_pod(&self, pod: &Pod) -> Result<()> {
        self.perform(TaskKind::Restart, pod.uid()).await
    }

    async fn delete_pod_by_uid(&self, pod_uid: &PodUid) -> Result<()> {
        self.perform(TaskKind::DeleteByUid, pod_uid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pod() -> Pod {
        Pod::new(PodUid::parse("p1").unwrap(), "web")
    }

    #[tokio::test]
    async fn test_mock_runtime_records_calls() {
        let runtime = MockRuntime::new();
        let pod = test_pod();

        runtime.create_pod(&pod).await.unwrap();
        runtime.stop_pod(&pod).await.unwrap();
        runtime.delete_pod_by_uid(pod.uid()).await.unwrap();

        assert_eq!(
            runtime.calls_for(pod.uid()).await,
            vec![TaskKind::Add, TaskKind::Stop, TaskKind::DeleteByUid]
        );
    }

    #[tokio::test]
    async fn test_mock_runtime_failing_on() {
        let runtime = MockRuntime::new().failing_on(TaskKind::Start);
        let pod = test_pod();

        assert!(runtime.create_pod(&pod).await.is_ok());
        assert!(runtime.start_pod(&pod).await.is_err());
        // Failed calls are still recorded.
        assert_eq!(runtime.calls().await.len(), 2);
    }

    #[tokio::test]
    async fn test_mock_runtime_failing() {
        let runtime = MockRuntime::failing();
        let pod = test_pod();

        assert!(runtime.create_pod(&pod).await.is_err());
        assert!(runtime.restart_pod(&pod).await.is_err());
        assert!(runtime.delete_pod(&pod).await.is_err());
    }
}
