//! ReconWatch Queue
//!
//! Worker Pool: fixed worker count, lease/sleep/dispatch/heartbeat/
//! complete-or-fail loop, concurrency caps enforced at dequeue time by
//! the store layer, non-blocking cap misses.

pub mod handler;
pub mod pool;

pub use handler::{HandlerOutcome, JobHandler};
pub use pool::{dispatch_key, WorkerPool};
