//! Background synchronization of captured events with the remote service.

mod engine;
mod scheduler;

pub use engine::{SyncEngine, SyncOutcome};
pub use scheduler::{
    backoff_delay, Job, JobConstraints, JobOutcome, SyncNudge, SyncTrigger, SyncWorker,
    SyncWorkerHandle, WorkerSettings,
};
