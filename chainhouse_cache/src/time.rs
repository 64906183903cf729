//! Time source abstraction.
//!
//! TTL expiry is driven through a trait so tests can advance a mock clock
//! instead of sleeping.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

pub trait TimeProvider: std::fmt::Debug + Send + Sync + 'static {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// [`TimeProvider`] backed by the wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProvider;

impl SystemProvider {
    pub fn new() -> Self {
        Self
    }
}

impl TimeProvider for SystemProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// [`TimeProvider`] that returns a manually-advanced time.
#[derive(Debug)]
pub struct MockProvider {
    now: Mutex<DateTime<Utc>>,
}

impl MockProvider {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn inc(&self, d: Duration) {
        let mut now = self.now.lock();
        *now += TimeDelta::from_std(d).expect("duration in range");
    }
}

impl TimeProvider for MockProvider {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
