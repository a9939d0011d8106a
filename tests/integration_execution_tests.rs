//! # Execution Engine Integration Tests / 执行引擎集成测试
//!
//! Scheduling plus execution against scripted executors: worker pool, retries,
//! timeouts, fail-fast and cancellation.
//!
//! 针对脚本化执行器的调度与执行：工作池、重试、超时、快速失败和取消。

mod common;

use common::{Behavior, MockExecutor};
use risk_runner::core::execution::{EngineOptions, ExecutionEngine, ProgressEvent, run_batches};
use risk_runner::core::scheduler::{UniformCost, schedule, with_costs};
use risk_runner::models::{Batch, RunReport, TestId};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn options(workers: usize, timeout: Duration, max_retries: u32, fail_fast: bool) -> EngineOptions {
    EngineOptions {
        workers,
        timeout,
        max_retries,
        fail_fast,
    }
}

fn batches(tests: usize, batch_size: usize) -> Vec<Batch> {
    schedule(with_costs(&common::test_ids(tests), &UniformCost), batch_size)
}

#[cfg(test)]
mod pool_tests {
    use super::*;

    #[tokio::test]
    async fn test_45_passing_tests_in_three_batches() {
        let executor = MockExecutor::new(Behavior::Pass);
        let results = run_batches(&executor, batches(45, 20), 4, Duration::from_secs(30), 2, false).await;
        let report = RunReport::aggregate(results);

        assert_eq!(report.total_tests, 45);
        assert_eq!(report.passed.len(), 45);
        assert_eq!(report.failed.len(), 0);
        assert_eq!(report.batches, 3);
        assert_eq!(report.summary.pass_rate, 100.0);
        assert_eq!(executor.total_calls(), 3);
        assert!(report.batch_results.iter().all(|r| r.attempts == 1));
    }

    #[tokio::test]
    async fn test_results_are_ordered_by_batch_index() {
        let executor = MockExecutor::new(Behavior::Pass).delay(Duration::from_millis(10));
        let results = run_batches(&executor, batches(50, 5), 4, Duration::from_secs(30), 0, false).await;

        let order: Vec<usize> = results.iter().map(|r| r.batch_id).collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_every_batch_runs_once_with_a_single_worker() {
        let executor = MockExecutor::new(Behavior::Pass);
        let results = run_batches(&executor, batches(12, 3), 1, Duration::from_secs(30), 0, false).await;
        assert_eq!(results.len(), 4);
        assert!((0..4).all(|i| executor.calls(i) == 1));
    }

    #[tokio::test]
    async fn test_empty_schedule() {
        let executor = MockExecutor::new(Behavior::Pass);
        let results = run_batches(&executor, Vec::new(), 4, Duration::from_secs(30), 2, true).await;
        assert!(results.is_empty());
        assert_eq!(executor.total_calls(), 0);
    }
}

#[cfg(test)]
mod retry_tests {
    use super::*;

    #[tokio::test]
    async fn test_persistent_failure_is_retried_up_to_the_limit() {
        let executor = MockExecutor::new(Behavior::Pass).batch(1, Behavior::Fail);
        let results = run_batches(&executor, batches(30, 10), 3, Duration::from_secs(30), 2, false).await;

        assert_eq!(executor.calls(0), 1);
        assert_eq!(executor.calls(1), 3);
        assert_eq!(executor.calls(2), 1);
        assert_eq!(results[1].attempts, 3);
        assert_eq!(results[1].failed.len(), 10);
    }

    #[tokio::test]
    async fn test_flaky_batch_recovers_on_retry() {
        let executor = MockExecutor::new(Behavior::FailTimes(1));
        let results = run_batches(&executor, batches(10, 5), 2, Duration::from_secs(30), 2, false).await;
        let report = RunReport::aggregate(results);

        assert!(report.is_success());
        assert_eq!(report.passed.len(), 10);
        assert!(report.batch_results.iter().all(|r| r.attempts == 2));
        assert_eq!(executor.total_calls(), 4);
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let executor = MockExecutor::new(Behavior::Fail);
        let results = run_batches(&executor, batches(4, 2), 2, Duration::from_secs(30), 0, false).await;
        assert_eq!(executor.total_calls(), 2);
        assert!(results.iter().all(|r| r.attempts == 1 && r.has_failures()));
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_the_passing_members() {
        let failing = common::test_ids(6)[4].clone();
        let executor = MockExecutor::new(Behavior::FailTests(vec![failing.clone()]));
        let results = run_batches(&executor, batches(6, 3), 2, Duration::from_secs(30), 1, false).await;
        let report = RunReport::aggregate(results);

        assert_eq!(report.failed, vec![failing]);
        assert_eq!(report.passed.len(), 5);
        assert_eq!(executor.calls(0), 1);
        assert_eq!(executor.calls(1), 2);
    }

    #[tokio::test]
    async fn test_errored_batch_counts_as_failed() {
        let executor = MockExecutor::new(Behavior::Pass).batch(0, Behavior::Error("spawn failed".to_string()));
        let results = run_batches(&executor, batches(4, 2), 2, Duration::from_secs(30), 1, false).await;

        assert_eq!(results[0].failed.len(), 2);
        assert_eq!(results[0].stderr, "spawn failed");
        assert_eq!(results[0].exit_code, -1);
        assert_eq!(results[0].attempts, 2);
        assert!(!results[1].has_failures());
    }
}

#[cfg(test)]
mod timeout_tests {
    use super::*;

    #[tokio::test]
    async fn test_hanging_batch_times_out() {
        let executor = MockExecutor::new(Behavior::Pass).batch(0, Behavior::Hang);
        let results = run_batches(&executor, batches(4, 2), 2, Duration::from_millis(100), 1, false).await;

        let timed_out = &results[0];
        assert!(timed_out.timed_out);
        assert_eq!(timed_out.attempts, 2);
        assert_eq!(timed_out.duration, Duration::from_millis(100));
        assert_eq!(timed_out.exit_code, -1);
        assert_eq!(timed_out.stderr, "Timeout after 0.1 seconds");
        assert_eq!(timed_out.failed.len(), 2);
        assert!(!results[1].timed_out);
    }
}

#[cfg(test)]
mod fail_fast_tests {
    use super::*;

    #[tokio::test]
    async fn test_first_failure_stops_the_run_without_retries() {
        let executor = MockExecutor::new(Behavior::Pass).batch(0, Behavior::Fail);
        let results = run_batches(&executor, batches(20, 5), 1, Duration::from_secs(30), 3, true).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].batch_id, 0);
        assert_eq!(executor.calls(0), 1);
        assert_eq!(executor.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_in_flight_batches_are_dropped() {
        let executor = MockExecutor::new(Behavior::Hang).batch(0, Behavior::Fail);
        let run = run_batches(&executor, batches(12, 3), 4, Duration::from_secs(60), 2, true);
        let results = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("fail-fast must not wait for in-flight batches");

        assert_eq!(results.len(), 1);
        assert!(results[0].has_failures());
    }

    #[tokio::test]
    async fn test_fail_fast_with_passing_batches_completes() {
        let executor = MockExecutor::new(Behavior::Pass);
        let results = run_batches(&executor, batches(9, 3), 2, Duration::from_secs(30), 2, true).await;
        assert_eq!(results.len(), 3);
    }
}

#[cfg(test)]
mod cancellation_tests {
    use super::*;

    #[tokio::test]
    async fn test_cancellation_stops_hanging_batches() {
        let executor = MockExecutor::new(Behavior::Hang);
        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = ExecutionEngine::new(&executor, options(2, Duration::from_secs(60), 2, false))
            .with_cancellation(token.clone())
            .with_events(tx);

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });
        let results = tokio::time::timeout(Duration::from_secs(5), engine.run(batches(6, 2)))
            .await
            .expect("cancelled run must return");
        canceller.await.unwrap();
        drop(engine);

        assert!(results.is_empty());
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(events.contains(&ProgressEvent::Cancelled));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, ProgressEvent::BatchStarted { .. }))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_already_cancelled_token_runs_nothing_to_completion() {
        let executor = MockExecutor::new(Behavior::Pass).delay(Duration::from_millis(200));
        let token = CancellationToken::new();
        token.cancel();
        let engine = ExecutionEngine::new(&executor, options(2, Duration::from_secs(5), 0, false))
            .with_cancellation(token);

        assert!(engine.run(batches(4, 2)).await.is_empty());
    }
}

#[cfg(test)]
mod event_tests {
    use super::*;

    #[tokio::test]
    async fn test_events_cover_starts_finishes_and_retries() {
        let executor = MockExecutor::new(Behavior::Pass).batch(1, Behavior::FailTimes(1));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = ExecutionEngine::new(&executor, options(2, Duration::from_secs(30), 2, false)).with_events(tx);
        let results = engine.run(batches(6, 3)).await;
        drop(engine);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        let started = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::BatchStarted { .. }))
            .count();
        let finished = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::BatchFinished(_)))
            .count();
        assert_eq!(started, 3);
        assert_eq!(finished, 3);
        assert!(events.contains(&ProgressEvent::Retrying {
            batch: 1,
            attempt: 2,
            max_attempts: 3,
        }));
        assert!(results.iter().all(|r| !r.has_failures()));
    }
}

#[cfg(all(test, unix))]
mod command_executor_tests {
    use super::*;
    use risk_runner::infra::command::CommandExecutor;
    use tempfile::tempdir;

    const SCRIPT: &str = r#"for t in "$@"; do
  case "$t" in
    *fail*) echo "$t FAILED" ;;
    *) echo "$t PASSED" ;;
  esac
done
"#;

    fn batch_of(ids: &[&str]) -> Batch {
        Batch {
            index: 0,
            tests: ids.iter().map(|id| TestId::from(*id)).collect(),
            cost: ids.len() as f64,
        }
    }

    #[tokio::test]
    async fn test_runner_output_is_parsed_per_test() {
        let dir = tempdir().unwrap();
        common::write_file(dir.path(), "run.sh", SCRIPT);
        let executor = CommandExecutor::new("sh run.sh {tests}", dir.path());

        let results = run_batches(
            &executor,
            vec![batch_of(&["a.py::test_ok", "b.py::test_fail"])],
            1,
            Duration::from_secs(30),
            0,
            false,
        )
        .await;
        assert_eq!(results[0].passed, vec![TestId::from("a.py::test_ok")]);
        assert_eq!(results[0].failed, vec![TestId::from("b.py::test_fail")]);
        assert!(results[0].stdout.contains("a.py::test_ok PASSED"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_with_all_tests_passing_is_not_a_failure() {
        let dir = tempdir().unwrap();
        common::write_file(
            dir.path(),
            "run.sh",
            "for t in \"$@\"; do echo \"$t PASSED\"; done\nexit 1\n",
        );
        let executor = CommandExecutor::new("sh run.sh {tests}", dir.path());

        let results = run_batches(
            &executor,
            vec![batch_of(&["a.py::test_one", "a.py::test_two[x y]"])],
            1,
            Duration::from_secs(30),
            2,
            false,
        )
        .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].exit_code, 1);
        assert_eq!(results[0].attempts, 1);
        assert!(results[0].failed.is_empty());
        assert_eq!(
            results[0].passed,
            vec![TestId::from("a.py::test_one"), TestId::from("a.py::test_two[x y]")]
        );
        assert!(RunReport::aggregate(results).is_success());
    }

    #[tokio::test]
    async fn test_slow_runner_is_killed_at_the_timeout() {
        let dir = tempdir().unwrap();
        let executor = CommandExecutor::new("sh -c 'sleep 10' {tests}", dir.path());

        let results = run_batches(
            &executor,
            vec![batch_of(&["a.py::test_slow"])],
            1,
            Duration::from_millis(200),
            0,
            false,
        )
        .await;
        assert!(results[0].timed_out);
        assert_eq!(results[0].failed, vec![TestId::from("a.py::test_slow")]);
    }

    #[tokio::test]
    async fn test_missing_runner_is_an_error_result() {
        let dir = tempdir().unwrap();
        let executor = CommandExecutor::new("risk-runner-no-such-program {tests}", dir.path());

        let results = run_batches(&executor, vec![batch_of(&["a.py::test_x"])], 1, Duration::from_secs(5), 0, false).await;
        assert!(!results[0].timed_out);
        assert!(results[0].has_failures());
        assert!(results[0].stderr.contains("risk-runner-no-such-program"));
    }
}
