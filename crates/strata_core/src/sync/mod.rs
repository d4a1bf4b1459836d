//! # Background Work, Main-Thread Delivery
//!
//! Generation runs off the interactive thread; installation never does.
//!
//! ## The Problem
//!
//! ```text
//! Main thread:   owns chunks, meshes, colliders (not Sync, not shared)
//! Workers:       must build height maps and meshes without touching them
//! ```
//!
//! ## The Solution: Result Pump
//!
//! ```text
//! submit(work, on_main) ──> bounded channel ──> worker N runs work()
//!                                                    │
//!                  completed queue (mutex) <─────────┘ pushes on_main(result)
//!                           │
//! tick: drain() ────────────┘ snapshot, run callbacks FIFO on main thread
//! ```
//!
//! The mutex is held only to push or to swap out the snapshot, never while
//! a job runs. Results that land mid-drain wait for the next tick.

mod work_queue;

pub use work_queue::{
    Completion,
    QueueError,
    QueueResult,
    WorkQueue,
    WorkQueueConfig,
};
