//! minik8s Node Agent Library
//!
//! The node agent runs on every node and applies pod lifecycle commands to
//! the local container runtime. Desired state is decided upstream; this crate
//! makes sure the resulting commands reach the runtime safely.
//!
//! ## Architecture
//!
//! ```text
//! watch transport ──PodEvent──> Reconciler
//!                                  │
//!                                  ▼
//!                          PodWorkerManager          (uid -> worker table)
//!                          ├── PodWorker(uid)        (bounded FIFO, one task at a time)
//!                          └── PodWorker(uid)
//!                                  │
//!                                  ▼
//!                              PodRuntime            (shared container runtime)
//! ```
//!
//! Work for one pod is strictly ordered; different pods proceed
//! concurrently. Submitting never waits on the runtime.
//!
//! ## Modules
//!
//! - `worker`: Pod workers, lifecycle tasks, and the routing manager
//! - `runtime`: Container runtime interface and mock runtime
//! - `reconciler`: Desired-state event loop driving the manager
//! - `pod`: Pod descriptors

pub mod config;
pub mod error;
pub mod pod;
pub mod reconciler;
pub mod runtime;
pub mod worker;

// Re-export commonly used types
pub use error::PodWorkerError;
pub use pod::{ContainerSpec, Pod};
pub use runtime::{MockRuntime, PodRuntime};
pub use worker::{PodTask, PodWorkerManager, TaskKind, TaskTicket, WorkerPhase};
