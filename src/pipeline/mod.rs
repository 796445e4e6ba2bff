// src/pipeline/mod.rs
//
// Per-fight job plumbing:
//   context     → one per run: config, inference pool, metrics
//   worker_pool → bounded window-scoring pool (backpressure, timeout, retry)
//   cancel      → job cancellation + model-unavailable signal
//   audit       → per-job skip/suppress record
//   fight_job   → the staged pipeline for one fight

pub mod audit;
pub mod cancel;
pub mod context;
pub mod fight_job;
pub mod metrics;
pub mod worker_pool;

pub use audit::{AuditLog, AuditRecord};
pub use cancel::{CancelToken, JobSignals};
pub use context::AnalysisContext;
pub use fight_job::{run_fight, FightReport, JobSummary};
pub use metrics::{MetricsSummary, PipelineMetrics};
pub use worker_pool::{InferencePool, WindowOutcome};
