use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use risk_runner::config::CategoryRoots;
use risk_runner::core::execution::{BatchExecutor, run_batches};
use risk_runner::core::scheduler::{CostedTest, UniformCost, WeightedCost, schedule, with_costs};
use risk_runner::models::{Batch, BatchOutcome, RunnerReport, SpeedMarker, TestId};
use std::hint::black_box;
use std::time::Duration;
use tokio::runtime::Runtime;

fn test_ids(count: usize) -> Vec<TestId> {
    let dirs = ["unit", "integration", "behavior"];
    (0..count)
        .map(|i| TestId::new(format!("tests/{}/test_mod{}.py::test_case_{i}", dirs[i % 3], i % 50)))
        .collect()
}

fn bench_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule");
    for count in [100usize, 1_000, 5_000] {
        let tests = test_ids(count);
        let model = WeightedCost::new(CategoryRoots::default()).with_markers(
            tests
                .iter()
                .step_by(7)
                .map(|test| (test.clone(), SpeedMarker::Slow)),
        );
        let costed: Vec<CostedTest> = with_costs(&tests, &model);

        group.bench_with_input(BenchmarkId::new("weighted", count), &costed, |b, costed| {
            b.iter(|| schedule(black_box(costed.clone()), 20));
        });
        group.bench_with_input(BenchmarkId::new("uniform", count), &tests, |b, tests| {
            b.iter(|| schedule(with_costs(black_box(tests), &UniformCost), 20));
        });
    }
    group.finish();
}

/// Reports every member as passed without spawning anything.
struct InstantPass;

impl BatchExecutor for InstantPass {
    async fn execute(&self, batch: &Batch) -> BatchOutcome {
        BatchOutcome::Completed(RunnerReport {
            passed: batch.tests.clone(),
            exit_code: Some(0),
            ..RunnerReport::default()
        })
    }
}

fn bench_engine(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let batches = schedule(with_costs(&test_ids(1_000), &UniformCost), 20);

    c.bench_function("engine_1000_tests_8_workers", |b| {
        b.to_async(&rt).iter(|| async {
            let results = run_batches(InstantPass, batches.clone(), 8, Duration::from_secs(5), 0, false).await;
            black_box(results);
        });
    });
}

criterion_group!(benches, bench_schedule, bench_engine);
criterion_main!(benches);
