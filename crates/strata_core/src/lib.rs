//! # STRATA Core
//!
//! Shared foundations for the terrain pipeline:
//! - Plain-old-data math types used for every vertex buffer
//! - The background work pump that keeps generation off the main thread
//!
//! ## Architecture Rules
//!
//! 1. **Workers own their inputs** - jobs capture copies, never engine state
//! 2. **Main thread installs** - results are applied only inside `drain`
//! 3. **Bounded** - a fixed pool and a bounded queue; overload is rejected
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_core::{WorkQueue, WorkQueueConfig};
//!
//! let queue: WorkQueue<Vec<f32>> = WorkQueue::new(WorkQueueConfig::default());
//! queue.submit(|| expensive(), |value, out: &mut Vec<f32>| out.push(value))?;
//! queue.drain(&mut results); // once per tick
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod math;
pub mod sync;

pub use math::{inverse_lerp, lerp, Bounds2, Vec2, Vec3};
pub use sync::{Completion, QueueError, QueueResult, WorkQueue, WorkQueueConfig};
