//! Lifecycle tasks queued to a pod worker.

use std::fmt;
use std::sync::Arc;

use minik8s_id::PodUid;

use crate::pod::Pod;

/// A single lifecycle command for one pod.
#[derive(Debug, Clone)]
pub enum PodTask {
    /// Create the pod's containers.
    Add(Arc<Pod>),
    /// Delete the pod's containers.
    Delete(Arc<Pod>),
    Start(Arc<Pod>),
    Stop(Arc<Pod>),
    Restart(Arc<Pod>),
    /// Delete a pod known only by identity, e.g. after the runtime reported
    /// its containers gone without any control-plane command.
    DeleteByUid(PodUid),
}

impl PodTask {
    pub fn kind(&self) -> TaskKind {
        match self {
            PodTask::Add(_) => TaskKind::Add,
            PodTask::Delete(_) => TaskKind::Delete,
            PodTask::Start(_) => TaskKind::Start,
            PodTask::Stop(_) => TaskKind::Stop,
            PodTask::Restart(_) => TaskKind::Restart,
            PodTask::DeleteByUid(_) => TaskKind::DeleteByUid,
        }
    }

    /// Identity of the pod this task targets.
    pub fn pod_uid(&self) -> &PodUid {
        match self {
            PodTask::Add(pod)
            | PodTask::Delete(pod)
            | PodTask::Start(pod)
            | PodTask::Stop(pod)
            | PodTask::Restart(pod) => pod.uid(),
            PodTask::DeleteByUid(pod_uid) => pod_uid,
        }
    }
}

/// Discriminant of [`PodTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Add,
    Delete,
    Start,
    Stop,
    Restart,
    DeleteByUid,
}

impl TaskKind {
    /// True for the kinds that retire the pod's worker.
    pub fn is_delete(self) -> bool {
        matches!(self, TaskKind::Delete | TaskKind::DeleteByUid)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::Add => "create",
            TaskKind::Delete => "delete",
            TaskKind::Start => "start",
            TaskKind::Stop => "stop",
            TaskKind::Restart => "restart",
            TaskKind::DeleteByUid => "delete-by-uid",
        };
        f.write_str(s)
    }
}
