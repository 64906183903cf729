//! The fan-out aggregator: normalize, split per chain, and run each group
//! through fingerprint → result store → coalescing queue, in parallel.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use futures::{future::try_join_all, FutureExt};
use thiserror::Error;
use tracing::{debug, warn};

use chainhouse_cache::{
    coalesce::{ComputeError, ComputeWork},
    CoalescingQueue, QueueError, ResultStore,
};
use chainhouse_types::{
    canonical::{normalize, CanonicalRequest},
    fingerprint::CacheKey,
    http::{chain_total, AnalyticsRequest, AnalyticsResponse, ValidationError},
};
use chainhouse_warehouse::{AnalyticsAdapter, PartitionResult};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    /// A cached payload failed to deserialize. Distinct from a compute
    /// failure: the entry is dropped so the next request recomputes it.
    #[error("corrupt cached result: {0}")]
    CorruptCachedResult(#[from] serde_json::Error),
}

/// Pipeline tuning; see the serve command for the flags behind these.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Width of the time bucket grid applied during normalization.
    pub bucket_seconds: i64,
    /// Bound on how long a caller waits for a coalesced result. `None`
    /// waits as long as the computation takes.
    pub wait_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bucket_seconds: chainhouse_types::canonical::DEFAULT_BUCKET_SECONDS,
            wait_timeout: None,
        }
    }
}

/// See the [module docs](self).
#[derive(Debug)]
pub struct QueryPipeline {
    store: Arc<dyn ResultStore>,
    queue: Arc<CoalescingQueue>,
    config: PipelineConfig,
}

impl QueryPipeline {
    pub fn new(
        store: Arc<dyn ResultStore>,
        queue: Arc<CoalescingQueue>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            queue,
            config,
        }
    }

    /// Execute `raw` against `adapter` and merge the per-chain results.
    ///
    /// Any chain group failing (after the queue's retries) fails the whole
    /// response; callers retry the entire request.
    pub async fn execute(
        &self,
        adapter: &Arc<dyn AnalyticsAdapter>,
        raw: &AnalyticsRequest,
    ) -> Result<AnalyticsResponse, PipelineError> {
        raw.validate()?;
        let canonical = normalize(raw, self.config.bucket_seconds);

        let groups = canonical.split_by_chain();
        let results: Vec<PartitionResult> = try_join_all(
            groups
                .into_iter()
                .map(|group| self.execute_group(Arc::clone(adapter), group)),
        )
        .await?;

        Ok(AnalyticsResponse {
            total: results
                .iter()
                .map(|r| chain_total(r.chain, adapter.value_field(), r.value))
                .collect(),
            start_timestamp: canonical.start_timestamp,
            end_timestamp: canonical.end_timestamp,
        })
    }

    /// Drop any cached results for `raw` under `adapter`, returning the
    /// number of per-chain keys invalidated.
    pub async fn invalidate(
        &self,
        adapter: &Arc<dyn AnalyticsAdapter>,
        raw: &AnalyticsRequest,
    ) -> Result<usize, PipelineError> {
        raw.validate()?;
        let canonical = normalize(raw, self.config.bucket_seconds);

        let groups = canonical.split_by_chain();
        let mut invalidated = 0;
        for group in &groups {
            let key = CacheKey::new(adapter.name(), group);
            match self.store.delete(&key).await {
                Ok(()) => invalidated += 1,
                Err(e) => warn!(%key, error = %e, "failed to invalidate cached result"),
            }
        }
        Ok(invalidated)
    }

    async fn execute_group(
        &self,
        adapter: Arc<dyn AnalyticsAdapter>,
        group: CanonicalRequest,
    ) -> Result<PartitionResult, PipelineError> {
        let key = CacheKey::new(adapter.name(), &group);

        match self.store.get(&key).await {
            Ok(Some(bytes)) => {
                debug!(%key, "cache hit");
                return decode_cached(&bytes);
            }
            Ok(None) => debug!(%key, "cache miss"),
            Err(e) => warn!(%key, error = %e, "result store unavailable, treating as miss"),
        }

        let work: ComputeWork = Box::new(move || {
            let adapter = Arc::clone(&adapter);
            let group = group.clone();
            async move {
                let result = adapter
                    .compute(&group)
                    .await
                    .map_err(|e| ComputeError::new(e.to_string()))?;
                let bytes = serde_json::to_vec(&result)
                    .map_err(|e| ComputeError::new(e.to_string()))?;
                Ok(Bytes::from(bytes))
            }
            .boxed()
        });

        let bytes = match self.config.wait_timeout {
            Some(timeout) => self.queue.submit_with_timeout(key, work, timeout).await?,
            None => self.queue.submit(key, work).await?,
        };
        decode_cached(&bytes)
    }
}

fn decode_cached(bytes: &[u8]) -> Result<PartitionResult, PipelineError> {
    Ok(serde_json::from_slice(bytes)?)
}
