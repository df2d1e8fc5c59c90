//! Bounded parallel execution of per-file tasks
//!
//! This module owns the scheduling side of a run: how many operations may
//! execute at once, what happens when one of them fails, and when the run is
//! allowed to report.
//!
//! # Architecture Responsibilities
//!
//! ## What This Module Does:
//! - **Resource Discovery**: Sizes the admission gate from `num_cpus::get()` unless overridden
//! - **Admission**: One unit per task, at most N of them executing the operation at once
//! - **Cancellation**: A one-way [`CancelSignal`] that stops admissions on first failure or interrupt
//! - **Completion Barrier**: Joins every dispatched unit before a [`RunReport`] exists
//!
//! ## What This Module Does NOT Do:
//! - **Domain Logic**: Knows nothing about JPEGs, temp files or the external tool
//! - **Retries**: Every task gets a single attempt
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │   Task Source   │───▶│   Scheduler      │───▶│   Operation     │
//! │                 │    │                  │    │                 │
//! │ • Dir scan      │    │ • Semaphore(N)   │    │ • recompress    │
//! │ • CLI paths     │    │ • CancelSignal   │    │ • atomic rename │
//! │                 │    │ • JoinSet barrier│    │                 │
//! └─────────────────┘    └──────────────────┘    └─────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use crush::parallel::{FailurePolicy, Scheduler};
//! use std::path::PathBuf;
//!
//! # async fn demo() {
//! let scheduler = Scheduler::new(crush::parallel::available_workers())
//!     .with_policy(FailurePolicy::FailFast);
//! let report = scheduler
//!     .run(vec![PathBuf::from("a.jpg")], |path| async move { Ok(path) })
//!     .await;
//! assert!(report.is_success());
//! # }
//! ```

pub mod cancel;
pub mod scheduler;

// Re-export main types for easier access
pub use cancel::{CancelSignal, Interrupted};
pub use scheduler::{FailurePolicy, RunReport, Scheduler, TaskFailure, TaskOutcome};

/// Number of processing units reported by the OS, never less than one.
pub fn available_workers() -> usize {
    num_cpus::get().max(1)
}
