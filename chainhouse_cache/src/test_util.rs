//! Mocks shared by this crate's tests and downstream crates' tests.

use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use chainhouse_types::fingerprint::CacheKey;

use crate::{
    coalesce::{ComputeError, ComputeWork},
    store::{MemoryResultStore, ResultStore, StoreError},
    time::SystemProvider,
};

/// An easy-to-mock compute function.
///
/// Responses are consumed in FIFO order; a call with no mocked response
/// left panics, and unconsumed responses panic on drop, so tests cannot
/// silently over- or under-mock.
#[derive(Debug, Default)]
pub struct TestCompute {
    responses: Mutex<Vec<Result<Bytes, ComputeError>>>,
    calls: AtomicUsize,
    latency: Mutex<Option<Duration>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl TestCompute {
    /// Mock the outcome of the next compute call.
    pub fn mock_next(&self, response: Result<Bytes, ComputeError>) {
        self.responses.lock().push(response);
    }

    /// Number of compute calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Sleep this long inside every compute call.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Block all compute calls until [`unblock_global`](Self::unblock_global).
    pub fn block_global(&self) {
        let mut gate = self.gate.lock();
        assert!(gate.is_none(), "already blocked");
        *gate = Some(Arc::new(Semaphore::new(0)));
    }

    /// Unblock all current and future compute calls.
    pub fn unblock_global(&self) {
        let gate = self.gate.lock().take().expect("not blocked");
        gate.add_permits(1 << 20);
    }

    /// A [`ComputeWork`] that runs against this mock.
    pub fn work(self: &Arc<Self>) -> ComputeWork {
        let this = Arc::clone(self);
        Box::new(move || {
            let this = Arc::clone(&this);
            async move {
                this.calls.fetch_add(1, Ordering::SeqCst);

                // capture the cloned gate handle so the lock guard does not
                // live across the await point
                let gate = this.gate.lock().clone();
                if let Some(gate) = gate {
                    let permit = gate.acquire().await.expect("gate is never closed");
                    permit.forget();
                }

                let latency = *this.latency.lock();
                if let Some(latency) = latency {
                    tokio::time::sleep(latency).await;
                }

                let mut responses = this.responses.lock();
                assert!(!responses.is_empty(), "no mocked response left");
                responses.remove(0)
            }
            .boxed()
        })
    }
}

impl Drop for TestCompute {
    fn drop(&mut self) {
        // prevent double-panic (i.e. aborts)
        if !std::thread::panicking() {
            assert!(
                self.responses.lock().is_empty(),
                "mocked response left"
            );
        }
    }
}

/// [`ResultStore`] wrapper with injectable backend failures, for the
/// degrade-to-recompute paths.
#[derive(Debug)]
pub struct FlakyStore {
    inner: MemoryResultStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl Default for FlakyStore {
    fn default() -> Self {
        Self {
            inner: MemoryResultStore::new(Arc::new(SystemProvider::new())),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }
}

impl FlakyStore {
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResultStore for FlakyStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::new("injected read failure"));
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::new("injected write failure"));
        }
        self.inner.put(key, value, ttl).await
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[should_panic(expected = "no mocked response left")]
    async fn panics_without_mocked_response() {
        let compute = Arc::new(TestCompute::default());
        let _ = compute.work()().await;
    }

    #[test]
    #[should_panic(expected = "mocked response left")]
    fn panics_on_unconsumed_response() {
        let compute = TestCompute::default();
        compute.mock_next(Ok(Bytes::from_static(b"v")));
    }

    #[tokio::test]
    async fn responses_are_fifo() {
        let compute = Arc::new(TestCompute::default());
        compute.mock_next(Ok(Bytes::from_static(b"a")));
        compute.mock_next(Err(ComputeError::new("b")));

        assert_eq!(compute.work()().await.unwrap(), Bytes::from_static(b"a"));
        assert!(compute.work()().await.is_err());
        assert_eq!(compute.calls(), 2);
    }
}
