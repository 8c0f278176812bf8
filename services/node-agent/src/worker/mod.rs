//! Pod lifecycle workers.
//!
//! Every pod with lifecycle work in flight gets exactly one [`PodWorker`]: an
//! actor owning a bounded FIFO of [`PodTask`]s that it applies to the shared
//! container runtime one at a time. Work for the same pod therefore never
//! interleaves, while workers for different pods run concurrently.
//!
//! ```text
//! Reconciler ──> PodWorkerManager ──┬── PodWorker(p1) ──┐
//!                (uid -> worker)    ├── PodWorker(p2) ──┼──> PodRuntime
//!                                   └── PodWorker(p3) ──┘
//! ```
//!
//! ## Worker lifecycle
//!
//! ```text
//! Absent --add_pod--> Active --delete_pod/delete_pod_by_uid--> Draining --drained--> Absent
//! ```
//!
//! A delete closes the worker's queue behind the delete task. The worker
//! finishes everything already queued and then retires, removing its routing
//! entry. Submissions never wait on the runtime: they either enqueue and hand
//! back a [`TaskTicket`] or fail immediately.

mod manager;
mod pod_worker;
mod task;

pub use manager::{PodWorkerManager, WorkerPhase};
pub use pod_worker::{
    PodWorker, PodWorkerHandle, TaskTicket, WorkerConfig, WorkerSummary,
    DEFAULT_QUEUE_CAPACITY,
};
pub use task::{PodTask, TaskKind};
