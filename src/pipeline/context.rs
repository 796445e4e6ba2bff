// src/pipeline/context.rs
//
// One analysis run's shared state, built once and passed explicitly to every
// fight job: configuration, the inference pool, and run-wide metrics.
// Fight jobs borrow it; nothing here is mutated per fight.

use crate::config::Config;
use crate::inference::FrameScorer;
use crate::pipeline::metrics::{MetricsSummary, PipelineMetrics};
use crate::pipeline::worker_pool::InferencePool;
use std::sync::Arc;
use tracing::info;

pub struct AnalysisContext {
    pub config: Arc<Config>,
    pub pool: InferencePool,
    pub metrics: PipelineMetrics,
}

impl AnalysisContext {
    /// Spawns the pool workers, so this must run inside a tokio runtime.
    pub fn new(config: Config, scorer: Arc<dyn FrameScorer>) -> Self {
        let metrics = PipelineMetrics::new();
        let pool = InferencePool::spawn(scorer, &config.pool, metrics.clone());
        info!(
            "analysis context ready: scorer={}, workers={}, queue={}",
            pool.scorer_name(),
            config.pool.workers,
            config.pool.queue_capacity
        );
        Self {
            config: Arc::new(config),
            pool,
            metrics,
        }
    }

    /// Stop the workers and return the run's final counters.
    pub async fn shutdown(self) -> MetricsSummary {
        self.pool.shutdown().await;
        self.metrics.summary()
    }
}
