//! Result caching and request coalescing for the chainhouse analytics API.
//!
//! # Concurrency
//!
//! Multiple submissions for different keys can run at the same time. When
//! work is submitted for the same key, the underlying computation runs only
//! once, even when the submissions arrive while it is still running; every
//! waiter receives the same outcome.
//!
//! # Cancellation
//!
//! A waiter abandoning its wait (timeout, dropped connection) does NOT
//! cancel the shared computation. The result is still persisted for future
//! callers.
//!
//! This crate is split into:
//!
//! * [`store`]: the fingerprint-keyed result store with TTL expiry
//! * [`coalesce`]: the single-flight queue with a bounded worker pool
//! * [`time`]: the time source abstraction driving TTL expiry
//! * [`test_util`]: mocks shared with downstream crates' tests

pub mod coalesce;
pub mod store;
pub mod test_util;
pub mod time;

pub use coalesce::{CoalescingQueue, ComputeError, QueueConfig, QueueError};
pub use store::{MemoryResultStore, ResultStore, StoreError};
