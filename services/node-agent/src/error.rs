//! Errors returned by the pod worker subsystem.

use minik8s_id::PodUid;
use thiserror::Error;

use crate::worker::TaskKind;

/// Errors surfaced to callers of the pod worker manager and worker handles.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PodWorkerError {
    /// A worker is already registered for this pod.
    #[error("pod {pod_uid} already has a worker")]
    AlreadyExists { pod_uid: PodUid },

    /// No worker is registered for this pod.
    #[error("pod {pod_uid} has no worker")]
    NotFound { pod_uid: PodUid },

    /// The worker's queue is at capacity.
    #[error("task queue for pod {pod_uid} is full (capacity {capacity})")]
    QueueFull { pod_uid: PodUid, capacity: usize },

    /// The pod's worker has accepted a delete and is draining its queue.
    #[error("pod {pod_uid} is draining")]
    Draining { pod_uid: PodUid },

    /// The worker's queue is closed and no longer accepts tasks.
    #[error("worker for pod {pod_uid} has stopped")]
    WorkerStopped { pod_uid: PodUid },

    /// The runtime failed to carry out an accepted task.
    #[error("runtime failed to {kind} pod {pod_uid}: {message}")]
    RuntimeOperationFailed {
        pod_uid: PodUid,
        kind: TaskKind,
        message: String,
    },
}

impl PodWorkerError {
    /// Returns true if the caller may resubmit the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PodWorkerError::QueueFull { .. } | PodWorkerError::Draining { .. }
        )
    }

    /// The pod this error concerns.
    pub fn pod_uid(&self) -> &PodUid {
        match self {
            PodWorkerError::AlreadyExists { pod_uid }
            | PodWorkerError::NotFound { pod_uid }
            | PodWorkerError::QueueFull { pod_uid, .. }
            | PodWorkerError::Draining { pod_uid }
            | PodWorkerError::WorkerStopped { pod_uid }
            | PodWorkerError::RuntimeOperationFailed { pod_uid, .. } => pod_uid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn uid() -> PodUid {
        PodUid::parse("p1").unwrap()
    }

    #[rstest]
    #[case(PodWorkerError::QueueFull { pod_uid: uid(), capacity: 4 }, true)]
    #[case(PodWorkerError::Draining { pod_uid: uid() }, true)]
    #[case(PodWorkerError::AlreadyExists { pod_uid: uid() }, false)]
    #[case(PodWorkerError::NotFound { pod_uid: uid() }, false)]
    #[case(PodWorkerError::WorkerStopped { pod_uid: uid() }, false)]
    fn test_is_retryable(#[case] error: PodWorkerError, #[case] expected: bool) {
        assert_eq!(error.is_retryable(), expected);
        assert_eq!(error.pod_uid(), &uid());
    }

    #[test]
    fn test_runtime_failure_message() {
        let error = PodWorkerError::RuntimeOperationFailed {
            pod_uid: uid(),
            kind: TaskKind::Restart,
            message: "container not found".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "runtime failed to restart pod p1: container not found"
        );
    }
}
