// src/pipeline/worker_pool.rs
//
// Bounded inference worker pool. Window tasks go through one bounded mpsc
// channel shared by all workers; when it is full, `submit` waits (backpressure)
// instead of piling up GPU calls. Each worker runs the synchronous scorer on
// the blocking pool under a timeout, retrying a timed-out window before giving
// up on it. Every scorer call holds a slot of a semaphore sized to the worker
// count until the call returns, even after its timeout fired, so at most
// `workers` calls are ever in flight. Results come back on a per-task oneshot,
// so the caller decides the order in which they are consumed.

use crate::config::PoolConfig;
use crate::error::{MinerError, ScorerError};
use crate::inference::{FrameScorer, WindowBatch, WindowScores};
use crate::pipeline::cancel::JobSignals;
use crate::pipeline::metrics::PipelineMetrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What happened to one submitted window.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowOutcome {
    Scored { scores: WindowScores, attempts: u32 },
    /// The scorer rejected the batch; only this window is lost.
    Malformed(String),
    TimedOut { attempts: u32 },
    /// The scorer cannot be reached; the owning job should stop.
    Unavailable(String),
    /// The job stopped before this window was scored.
    Skipped,
}

pub struct WindowTask {
    pub batch: WindowBatch,
    pub signals: JobSignals,
    pub result_sender: oneshot::Sender<WindowOutcome>,
}

pub struct InferencePool {
    task_sender: mpsc::Sender<WindowTask>,
    workers: Vec<JoinHandle<()>>,
    scorer_name: String,
}

impl InferencePool {
    pub fn spawn(scorer: Arc<dyn FrameScorer>, config: &PoolConfig, metrics: PipelineMetrics) -> Self {
        let (task_sender, task_receiver) = mpsc::channel::<WindowTask>(config.queue_capacity.max(1));
        let task_receiver = Arc::new(Mutex::new(task_receiver));
        let timeout = Duration::from_millis(config.timeout_ms);
        let attempts = config.retries + 1;
        let scorer_name = scorer.name().to_string();
        let in_flight = Arc::new(Semaphore::new(config.workers.max(1)));

        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                let receiver = Arc::clone(&task_receiver);
                let scorer = Arc::clone(&scorer);
                let in_flight = Arc::clone(&in_flight);
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    loop {
                        let task = {
                            let mut rx = receiver.lock().await;
                            rx.recv().await
                        };
                        let Some(task) = task else { break };

                        let outcome = if task.signals.should_stop() {
                            WindowOutcome::Skipped
                        } else {
                            Self::score_window(
                                &scorer,
                                &in_flight,
                                task.batch,
                                &task.signals,
                                timeout,
                                attempts,
                                &metrics,
                            )
                            .await
                        };
                        Self::count(&metrics, &outcome);
                        // Receiver gone means the job stopped listening; nothing to do
                        let _ = task.result_sender.send(outcome);
                    }
                    debug!(worker_id, "inference worker exiting");
                })
            })
            .collect();

        info!(
            "inference pool started: scorer={} workers={} queue={} timeout={}ms attempts={}",
            scorer_name,
            config.workers.max(1),
            config.queue_capacity.max(1),
            config.timeout_ms,
            attempts
        );

        Self {
            task_sender,
            workers,
            scorer_name,
        }
    }

    pub fn scorer_name(&self) -> &str {
        &self.scorer_name
    }

    async fn score_window(
        scorer: &Arc<dyn FrameScorer>,
        in_flight: &Arc<Semaphore>,
        batch: WindowBatch,
        signals: &JobSignals,
        timeout: Duration,
        attempts: u32,
        metrics: &PipelineMetrics,
    ) -> WindowOutcome {
        let batch = Arc::new(batch);
        for attempt in 1..=attempts {
            if signals.should_stop() {
                return WindowOutcome::Skipped;
            }

            // Waits while abandoned calls still occupy every slot
            let permit = tokio::select! {
                permit = Arc::clone(in_flight).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return WindowOutcome::Skipped,
                },
                _ = signals.cancel.cancelled() => return WindowOutcome::Skipped,
            };
            let scorer = Arc::clone(scorer);
            let job_batch = Arc::clone(&batch);
            let started = Instant::now();
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                scorer.score(&job_batch)
            });

            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(Ok(scores))) if !scores.is_finite() => {
                    return WindowOutcome::Malformed("scorer returned non-finite scores".to_string());
                }
                Ok(Ok(Ok(scores))) => {
                    metrics.add(&metrics.inference_time_us, started.elapsed().as_micros() as u64);
                    return WindowOutcome::Scored {
                        scores,
                        attempts: attempt,
                    };
                }
                Ok(Ok(Err(ScorerError::MalformedBatch(reason)))) => {
                    return WindowOutcome::Malformed(reason);
                }
                Ok(Ok(Err(ScorerError::Unavailable(reason)))) => {
                    signals.mark_unavailable();
                    return WindowOutcome::Unavailable(reason);
                }
                Ok(Err(join_err)) => {
                    return WindowOutcome::Malformed(format!("scorer task failed: {}", join_err));
                }
                Err(_) => {
                    // The call keeps its slot until it returns; its late result is discarded
                    warn!(
                        fight = %batch.fight_id,
                        fighter = %batch.fighter_id,
                        window = batch.window_id,
                        attempt,
                        "window inference timed out after {}ms",
                        timeout.as_millis()
                    );
                }
            }
        }
        WindowOutcome::TimedOut { attempts }
    }

    fn count(metrics: &PipelineMetrics, outcome: &WindowOutcome) {
        match outcome {
            WindowOutcome::Scored { .. } => metrics.inc(&metrics.windows_scored),
            WindowOutcome::Malformed(_) => metrics.inc(&metrics.windows_corrupt),
            WindowOutcome::TimedOut { .. } => metrics.inc(&metrics.windows_timed_out),
            WindowOutcome::Unavailable(_) | WindowOutcome::Skipped => metrics.inc(&metrics.windows_skipped),
        }
    }

    /// Queue one window. Waits while the queue is full; gives up with
    /// `Cancelled` if the job is cancelled while waiting.
    pub async fn submit(
        &self,
        batch: WindowBatch,
        signals: &JobSignals,
    ) -> Result<oneshot::Receiver<WindowOutcome>, MinerError> {
        let (result_sender, result_receiver) = oneshot::channel();
        let task = WindowTask {
            batch,
            signals: signals.clone(),
            result_sender,
        };

        tokio::select! {
            sent = self.task_sender.send(task) => {
                sent.map_err(|_| MinerError::ModelUnavailable("inference pool closed".to_string()))?;
                Ok(result_receiver)
            }
            _ = signals.cancel.cancelled() => Err(MinerError::Cancelled),
        }
    }

    /// Close the queue and wait for workers to drain it.
    pub async fn shutdown(self) {
        drop(self.task_sender);
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!("inference worker ended abnormally: {}", e);
            }
        }
        info!("inference pool stopped");
    }
}
