use std::time::Duration;

use prometheus::{Histogram, HistogramOpts, Registry};

use crate::error::BlobError;

pub const POLL_HIT_LATENCY: &str = "blob_store_poll_hit_latency";
pub const POLL_HIT_ITERATION: &str = "blob_store_poll_hit_iteration";

const LATENCY_BUCKETS: [f64; 10] = [0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0];
const ITERATION_BUCKETS: [f64; 6] = [1.0, 2.0, 5.0, 10.0, 20.0, 50.0];

/// Histograms recorded each time a wait loop resolves a blob.
///
/// Observability only: nothing in the wait loop reads them back.
#[derive(Clone)]
pub struct PollMetrics {
    latency: Histogram,
    iteration: Histogram,
}

impl PollMetrics {
    /// Create histograms that are not attached to any registry.
    pub fn new() -> Result<Self, BlobError> {
        let latency = Histogram::with_opts(
            HistogramOpts::new(
                POLL_HIT_LATENCY,
                "Seconds from the start of a wait until a blob was found",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )
        .map_err(|e| BlobError::Config(e.to_string()))?;

        let iteration = Histogram::with_opts(
            HistogramOpts::new(
                POLL_HIT_ITERATION,
                "Poll iteration (1-based) on which a blob was found",
            )
            .buckets(ITERATION_BUCKETS.to_vec()),
        )
        .map_err(|e| BlobError::Config(e.to_string()))?;

        Ok(Self { latency, iteration })
    }

    /// Create the histograms and register them with `registry`.
    pub fn register(registry: &Registry) -> Result<Self, BlobError> {
        let metrics = Self::new()?;
        registry
            .register(Box::new(metrics.latency.clone()))
            .map_err(|e| BlobError::Config(e.to_string()))?;
        registry
            .register(Box::new(metrics.iteration.clone()))
            .map_err(|e| BlobError::Config(e.to_string()))?;
        Ok(metrics)
    }

    pub fn observe_hit(&self, elapsed: Duration, iteration: u32) {
        self.latency.observe(elapsed.as_secs_f64());
        self.iteration.observe(f64::from(iteration));
    }

    pub fn latency(&self) -> &Histogram {
        &self.latency
    }

    pub fn iteration(&self) -> &Histogram {
        &self.iteration
    }
}
