//! Single-flight coalescing queue.
//!
//! The queue guarantees at-most-one in-flight computation per cache key:
//! the first submission for a key creates the in-flight unit and every
//! later submission attaches to it as a waiter. The unit runs on a
//! detached task gated by a bounded worker pool, retries the work a fixed
//! number of times, persists successful results to the [`ResultStore`] and
//! then delivers the single outcome to all waiters. Failures are delivered
//! but never cached, so the next submission for the key starts fresh.

use std::{collections::hash_map::Entry, collections::HashMap, sync::Arc, time::Duration};

use bytes::Bytes;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, warn};

use chainhouse_types::fingerprint::CacheKey;

use crate::store::ResultStore;

/// Failure of a single compute attempt against the warehouse.
///
/// Cloneable so one terminal failure can be delivered to every waiter.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ComputeError(Arc<str>);

impl ComputeError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into().into())
    }
}

#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// The work failed on every attempt; all waiters receive this same
    /// terminal failure.
    #[error("computation failed after {attempts} attempts: {source}")]
    ComputeFailed {
        attempts: usize,
        source: ComputeError,
    },

    /// The caller stopped waiting. The in-flight unit keeps running and
    /// still populates the cache for future callers.
    #[error("timed out waiting for in-flight computation")]
    WaitTimeout,

    /// The in-flight unit disappeared without resolving (its task panicked).
    #[error("in-flight computation was dropped before resolving")]
    UnitGone,
}

/// A unit of work: re-invoked on retry, so each attempt is independent.
pub type ComputeWork =
    Box<dyn Fn() -> BoxFuture<'static, Result<Bytes, ComputeError>> + Send + Sync>;

type Outcome = Result<Bytes, QueueError>;

/// Tuning knobs for the queue. Reference values match the production
/// deployment this engine was extracted from.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Upper bound on concurrently executing computations.
    pub concurrency: usize,
    /// Attempts per unit before surfacing failure to waiters.
    pub attempts: usize,
    /// TTL applied to successfully computed results.
    pub result_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 20,
            attempts: 3,
            result_ttl: Duration::from_secs(86_400),
        }
    }
}

/// See the [module docs](self).
#[derive(Debug)]
pub struct CoalescingQueue {
    store: Arc<dyn ResultStore>,
    config: QueueConfig,
    workers: Arc<Semaphore>,
    // The registry must support atomic create-if-absent-else-attach, so
    // all transitions happen under this one lock.
    inflight: Arc<Mutex<HashMap<CacheKey, Vec<oneshot::Sender<Outcome>>>>>,
}

impl CoalescingQueue {
    pub fn new(store: Arc<dyn ResultStore>, config: QueueConfig) -> Self {
        Self {
            store,
            config,
            workers: Arc::new(Semaphore::new(config.concurrency)),
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Submit work for `key` and wait for the shared outcome.
    ///
    /// If a unit is already running for `key` the caller attaches to it and
    /// `work` is dropped unused; otherwise a unit is created and `work` runs
    /// on a detached worker task.
    pub async fn submit(&self, key: CacheKey, work: ComputeWork) -> Outcome {
        let (tx, rx) = oneshot::channel();

        let run_unit = {
            let mut inflight = self.inflight.lock();
            match inflight.entry(key.clone()) {
                Entry::Occupied(mut occupied) => {
                    occupied.get_mut().push(tx);
                    false
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(vec![tx]);
                    true
                }
            }
        };

        if run_unit {
            debug!(%key, "creating in-flight unit");
            // Detached on purpose: a waiter timing out must not cancel the
            // shared computation.
            tokio::spawn(run(
                Arc::clone(&self.inflight),
                Arc::clone(&self.store),
                Arc::clone(&self.workers),
                self.config,
                key,
                work,
            ));
        } else {
            debug!(%key, "attaching to in-flight unit");
        }

        rx.await.unwrap_or(Err(QueueError::UnitGone))
    }

    /// Like [`submit`](Self::submit), but bound the caller's wait.
    ///
    /// On timeout only this waiter gives up; the unit continues to
    /// completion and populates the cache.
    pub async fn submit_with_timeout(
        &self,
        key: CacheKey,
        work: ComputeWork,
        timeout: Duration,
    ) -> Outcome {
        match tokio::time::timeout(timeout, self.submit(key, work)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(QueueError::WaitTimeout),
        }
    }

    /// Number of keys with a running unit.
    pub fn inflight_len(&self) -> usize {
        self.inflight.lock().len()
    }

    /// Number of waiters attached to the unit for `key` (submitter included).
    pub fn waiters_len(&self, key: &CacheKey) -> usize {
        self.inflight
            .lock()
            .get(key)
            .map(|waiters| waiters.len())
            .unwrap_or_default()
    }
}

/// Execute one in-flight unit and deliver its outcome to all waiters.
async fn run(
    inflight: Arc<Mutex<HashMap<CacheKey, Vec<oneshot::Sender<Outcome>>>>>,
    store: Arc<dyn ResultStore>,
    workers: Arc<Semaphore>,
    config: QueueConfig,
    key: CacheKey,
    work: ComputeWork,
) {
    let outcome = {
        // Admission control: when all workers are busy, unit execution
        // queues here instead of piling onto the warehouse.
        let _permit = Arc::clone(&workers)
            .acquire_owned()
            .await
            .expect("worker semaphore is never closed");

        execute(&store, &config, &key, work).await
    };

    let waiters = inflight.lock().remove(&key).unwrap_or_default();
    debug!(%key, waiters = waiters.len(), "in-flight unit resolved");
    for waiter in waiters {
        // A waiter may have stopped listening; that is its problem, not ours.
        let _ = waiter.send(outcome.clone());
    }
}

async fn execute(
    store: &Arc<dyn ResultStore>,
    config: &QueueConfig,
    key: &CacheKey,
    work: ComputeWork,
) -> Outcome {
    // The unit may have been created microseconds after an identical one
    // resolved; its result would already be in the store.
    match store.get(key).await {
        Ok(Some(value)) => {
            debug!(%key, "in-flight unit satisfied from store");
            return Ok(value);
        }
        Ok(None) => {}
        Err(e) => {
            warn!(%key, error = %e, "result store unavailable, computing anyway");
        }
    }

    let mut last_error = None;
    for attempt in 1..=config.attempts {
        match work().await {
            Ok(value) => {
                if let Err(e) = store.put(key, value.clone(), config.result_ttl).await {
                    // Deliver the value anyway; the next caller recomputes.
                    warn!(%key, error = %e, "failed to persist computed result");
                }
                return Ok(value);
            }
            Err(e) => {
                warn!(%key, attempt, error = %e, "compute attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(QueueError::ComputeFailed {
        attempts: config.attempts,
        source: last_error.expect("at least one attempt ran"),
    })
}
