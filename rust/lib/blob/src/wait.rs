use std::collections::{HashMap, HashSet};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::BlobError;
use crate::id::BlobId;
use crate::metrics::PollMetrics;
use crate::traits::BlobStore;

/// Sleep schedule between reads of a wait loop: truncated exponential backoff.
///
/// The n-th sleep (0-based) is `initial_interval_ms * multiplier^n`, capped at
/// `max_interval_ms`. A multiplier of 1 gives a fixed interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub multiplier: f64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: 100,
            max_interval_ms: 5_000,
            multiplier: 2.0,
        }
    }
}

impl PollPolicy {
    /// Constant interval between polls.
    pub fn fixed(interval: Duration) -> Self {
        let ms = interval.as_millis().min(u128::from(u64::MAX)) as u64;
        Self {
            initial_interval_ms: ms,
            max_interval_ms: ms,
            multiplier: 1.0,
        }
    }

    /// Reject schedules that would poll the backend in a tight loop.
    pub fn validate(&self) -> Result<(), BlobError> {
        if self.initial_interval_ms == 0 || self.max_interval_ms == 0 {
            return Err(BlobError::Config(format!(
                "poll intervals must be at least 1ms (initial={}ms, max={}ms)",
                self.initial_interval_ms, self.max_interval_ms
            )));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(BlobError::Config(format!(
                "poll multiplier must be a finite number >= 1, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }

    /// Sleep before the poll following the `attempt`-th one (0-based).
    /// Never shorter than 1ms.
    pub fn interval(&self, attempt: u32) -> Duration {
        // Multipliers below 1 (or NaN) would shrink the interval.
        let multiplier = self.multiplier.max(1.0);
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let ms = (self.initial_interval_ms as f64) * multiplier.powi(exponent);
        let capped = ms.min(self.max_interval_ms as f64);
        Duration::from_millis((capped as u64).max(1))
    }
}

/// PollingWaiter reads blobs from a store until they all show up, tolerating
/// backends that lag behind their writers.
#[derive(Clone, Default)]
pub struct PollingWaiter {
    policy: PollPolicy,
    metrics: Option<PollMetrics>,
    cancel: Option<CancellationToken>,
}

impl PollingWaiter {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            metrics: None,
            cancel: None,
        }
    }

    /// Record poll-hit latency and iteration histograms.
    pub fn with_metrics(mut self, metrics: PollMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Stop early once `token` is cancelled. Checked once per iteration,
    /// after the read; an in-flight read is never interrupted.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Read `ids` from `store`, retrying the missing ones.
    ///
    /// Gives up before starting a read that would begin past `timeout`, so
    /// the call may run up to one poll interval longer than `timeout`. Ids
    /// that never showed up map to `None`; running out of time is not an
    /// error. Backend errors are returned as-is and end the wait.
    pub fn wait<S: BlobStore + ?Sized>(
        &self,
        store: &S,
        ids: &[BlobId],
        timeout: Duration,
    ) -> Result<HashMap<BlobId, Option<Vec<u8>>>, BlobError> {
        let mut remaining: HashSet<BlobId> = ids.iter().copied().collect();
        let mut results: HashMap<BlobId, Option<Vec<u8>>> =
            remaining.iter().map(|id| (*id, None)).collect();

        let start = Instant::now();
        let mut poll_num: u32 = 0;

        while !remaining.is_empty() {
            let pending: Vec<BlobId> = remaining.iter().copied().collect();
            let current = store.read_blobs(&pending)?;
            let elapsed = start.elapsed();
            poll_num += 1;

            for (id, blob) in current {
                let Some(blob) = blob else { continue };
                if !remaining.remove(&id) {
                    continue;
                }
                results.insert(id, Some(blob));
                if let Some(metrics) = &self.metrics {
                    metrics.observe_hit(elapsed, poll_num);
                }
            }

            debug!(
                "blob wait poll {}: {} of {} blobs still missing after {:?}",
                poll_num,
                remaining.len(),
                results.len(),
                elapsed
            );

            if remaining.is_empty() {
                break;
            }

            let sleep = self.policy.interval(poll_num - 1);
            if elapsed + sleep >= timeout {
                warn!(
                    "blob wait gave up after {} polls ({:?}): {} blobs missing",
                    poll_num,
                    elapsed,
                    remaining.len()
                );
                break;
            }

            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                debug!("blob wait cancelled after {} polls", poll_num);
                break;
            }

            thread::sleep(sleep);
        }

        Ok(results)
    }
}

/// WaitingBlobStore gives a store's `read_and_wait_for_blobs` a configured
/// waiter (backoff, metrics, cancellation) instead of the default one.
pub struct WaitingBlobStore<S: BlobStore> {
    inner: S,
    waiter: PollingWaiter,
}

impl<S: BlobStore> WaitingBlobStore<S> {
    pub fn new(inner: S, waiter: PollingWaiter) -> Self {
        Self { inner, waiter }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn waiter(&self) -> &PollingWaiter {
        &self.waiter
    }
}

impl<S: BlobStore> BlobStore for WaitingBlobStore<S> {
    fn write_blobs(&self, blobs: &HashMap<BlobId, &[u8]>) -> Result<(), BlobError> {
        self.inner.write_blobs(blobs)
    }

    fn read_blobs(&self, ids: &[BlobId]) -> Result<HashMap<BlobId, Option<Vec<u8>>>, BlobError> {
        self.inner.read_blobs(ids)
    }

    fn check_blobs_exist(&self, ids: &[BlobId]) -> Result<HashMap<BlobId, bool>, BlobError> {
        self.inner.check_blobs_exist(ids)
    }

    fn write_blobs_with_unknown_hashes(&self, blobs: &[&[u8]]) -> Result<Vec<BlobId>, BlobError> {
        self.inner.write_blobs_with_unknown_hashes(blobs)
    }

    fn write_blob_with_unknown_hash(&self, blob: &[u8]) -> Result<BlobId, BlobError> {
        self.inner.write_blob_with_unknown_hash(blob)
    }

    fn read_blob(&self, id: &BlobId) -> Result<Option<Vec<u8>>, BlobError> {
        self.inner.read_blob(id)
    }

    fn check_blob_exists(&self, id: &BlobId) -> Result<bool, BlobError> {
        self.inner.check_blob_exists(id)
    }

    fn read_and_wait_for_blobs(
        &self,
        ids: &[BlobId],
        timeout: Duration,
    ) -> Result<HashMap<BlobId, Option<Vec<u8>>>, BlobError> {
        self.waiter.wait(&self.inner, ids, timeout)
    }
}
