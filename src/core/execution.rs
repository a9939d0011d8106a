//! # Batch Execution Engine Module / 批次执行引擎模块
//!
//! This module runs scheduled batches concurrently in a bounded worker pool.
//! It enforces per-batch timeouts, stops early in fail-fast mode, retries failed
//! batches sequentially after the pool phase and reports progress as events.
//!
//! 此模块在有界的工作池中并发运行已调度的批次。
//! 它强制执行每个批次的超时，在快速失败模式下提前停止，在工作池阶段之后顺序重试失败的批次，
//! 并以事件形式报告进度。

use futures::{StreamExt, stream};
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::config::ExecutionSection;
use crate::core::models::{Batch, BatchOutcome, ExecutionResult};

/// Runs one batch to completion. Implementations never fail: problems are reported
/// as [`BatchOutcome::Errored`]. Timeouts are enforced by the engine.
///
/// 将一个批次运行至完成。实现永远不会失败：问题以 [`BatchOutcome::Errored`] 报告。超时由引擎强制执行。
pub trait BatchExecutor: Send + Sync {
    fn execute(&self, batch: &Batch) -> impl Future<Output = BatchOutcome> + Send;
}

impl<T: BatchExecutor> BatchExecutor for &T {
    fn execute(&self, batch: &Batch) -> impl Future<Output = BatchOutcome> + Send {
        (**self).execute(batch)
    }
}

/// Engine settings.
/// 引擎设置。
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub workers: usize,
    pub timeout: Duration,
    pub max_retries: u32,
    pub fail_fast: bool,
}

impl EngineOptions {
    pub fn from_config(execution: &ExecutionSection) -> Self {
        Self {
            workers: execution.effective_workers(),
            timeout: Duration::from_secs(execution.timeout_secs),
            max_retries: execution.max_retries,
            fail_fast: execution.fail_fast,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        1 + self.max_retries
    }
}

/// Progress notifications, emitted in completion order.
/// 进度通知，按完成顺序发出。
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    BatchStarted { batch: usize, tests: usize, attempt: u32 },
    BatchFinished(ExecutionResult),
    Retrying { batch: usize, attempt: u32, max_attempts: u32 },
    FailFast { batch: usize },
    Cancelled,
}

/// What the pool phase does after a result arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep consuming.
    Continue,
    /// This result failed in fail-fast mode; stop consuming.
    FailFast,
    /// The phase was already stopped; the result was dropped.
    Stopped,
}

/// Bookkeeping of the pool phase: which results are kept and whether the phase
/// stopped early. Results are accepted in completion order; once stopped (fail-fast or
/// cancellation) nothing else is kept and no retries follow.
///
/// 工作池阶段的记录：保留哪些结果，以及该阶段是否提前停止。
#[derive(Debug)]
pub struct PoolPhase {
    fail_fast: bool,
    results: Vec<ExecutionResult>,
    stopped: bool,
}

impl PoolPhase {
    pub fn new(fail_fast: bool, capacity: usize) -> Self {
        Self {
            fail_fast,
            results: Vec::with_capacity(capacity),
            stopped: false,
        }
    }

    pub fn accept(&mut self, result: ExecutionResult) -> Flow {
        if self.stopped {
            return Flow::Stopped;
        }
        let failed = result.has_failures();
        self.results.push(result);
        if failed && self.fail_fast {
            self.stopped = true;
            Flow::FailFast
        } else {
            Flow::Continue
        }
    }

    pub fn cancel(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Kept results ordered by batch index, and whether the phase stopped early.
    pub fn finish(mut self) -> (Vec<ExecutionResult>, bool) {
        self.results.sort_by_key(|r| r.batch_id);
        (self.results, self.stopped)
    }
}

/// The distributed execution engine.
/// 分布式执行引擎。
pub struct ExecutionEngine<E> {
    executor: E,
    options: EngineOptions,
    cancel: CancellationToken,
    events: Option<UnboundedSender<ProgressEvent>>,
}

impl<E: BatchExecutor> ExecutionEngine<E> {
    pub fn new(executor: E, options: EngineOptions) -> Self {
        Self {
            executor,
            options,
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    /// Uses an external token (e.g. a Ctrl-C handler) to cancel the run.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_events(mut self, events: UnboundedSender<ProgressEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Runs every batch and returns one result per finished batch, ordered by batch index.
    ///
    /// All batches are submitted to a pool of `workers` and consumed in completion
    /// order. In fail-fast mode the first result with a failure stops consumption:
    /// in-flight batches are dropped (their processes killed), completed results are
    /// kept and no retries happen. Otherwise batches with failures are re-run one at a
    /// time, in batch-index order, until they pass or reach `1 + max_retries` attempts.
    /// Cancellation through the token behaves like fail-fast.
    ///
    /// 运行每个批次，并为每个完成的批次返回一个结果，按批次索引排序。
    pub async fn run(&self, batches: Vec<Batch>) -> Vec<ExecutionResult> {
        let workers = self.options.workers.max(1);
        info!(batches = batches.len(), workers, "starting batch execution");

        let mut phase = PoolPhase::new(self.options.fail_fast, batches.len());
        {
            let mut pending = stream::iter(batches.iter())
                .map(|batch| self.attempt(batch, 1))
                .buffer_unordered(workers);

            loop {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        warn!("execution cancelled");
                        self.emit(ProgressEvent::Cancelled);
                        phase.cancel();
                        break;
                    }
                    next = pending.next() => {
                        let Some(result) = next else { break };
                        let batch = result.batch_id;
                        self.emit(ProgressEvent::BatchFinished(result.clone()));
                        match phase.accept(result) {
                            Flow::Continue => {}
                            Flow::FailFast => {
                                info!(batch, "fail-fast triggered");
                                self.emit(ProgressEvent::FailFast { batch });
                                break;
                            }
                            Flow::Stopped => break,
                        }
                    }
                }
            }
        }

        let (mut results, stopped) = phase.finish();
        if !stopped {
            self.retry_failed(&batches, &mut results).await;
        }
        results
    }

    async fn retry_failed(&self, batches: &[Batch], results: &mut [ExecutionResult]) {
        let max_attempts = self.options.max_attempts();
        let by_index: HashMap<usize, &Batch> = batches.iter().map(|b| (b.index, b)).collect();

        for result in results.iter_mut() {
            let Some(batch) = by_index.get(&result.batch_id) else {
                continue;
            };
            while result.has_failures() && result.attempts < max_attempts {
                let attempt = result.attempts + 1;
                debug!(batch = batch.index, attempt, "retrying batch");
                self.emit(ProgressEvent::Retrying {
                    batch: batch.index,
                    attempt,
                    max_attempts,
                });
                let retried = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        self.emit(ProgressEvent::Cancelled);
                        return;
                    }
                    retried = self.attempt(batch, attempt) => retried,
                };
                self.emit(ProgressEvent::BatchFinished(retried.clone()));
                *result = retried;
            }
        }
    }

    /// One execution of one batch, bounded by the per-batch timeout.
    async fn attempt(&self, batch: &Batch, attempt: u32) -> ExecutionResult {
        self.emit(ProgressEvent::BatchStarted {
            batch: batch.index,
            tests: batch.len(),
            attempt,
        });
        let start = Instant::now();
        let outcome = match tokio::time::timeout(self.options.timeout, self.executor.execute(batch)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(batch = batch.index, timeout = ?self.options.timeout, "batch timed out");
                BatchOutcome::TimedOut
            }
        };
        if let BatchOutcome::Errored(message) = &outcome {
            warn!(batch = batch.index, error = %message, "batch could not be executed");
        }
        ExecutionResult::from_outcome(batch, outcome, start.elapsed(), self.options.timeout, attempt)
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(events) = &self.events {
            // A closed receiver only means nobody is listening.
            let _ = events.send(event);
        }
    }
}

/// Convenience wrapper: `run(batches, workers, timeout, max_retries, fail_fast)`.
pub async fn run_batches<E: BatchExecutor>(
    executor: E,
    batches: Vec<Batch>,
    workers: usize,
    timeout: Duration,
    max_retries: u32,
    fail_fast: bool,
) -> Vec<ExecutionResult> {
    let options = EngineOptions {
        workers,
        timeout,
        max_retries,
        fail_fast,
    };
    ExecutionEngine::new(executor, options).run(batches).await
}
