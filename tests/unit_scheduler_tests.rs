mod common;

use proptest::prelude::*;
use risk_runner::config::{CategoryRoots, CostMode};
use risk_runner::core::history::HistoryStore;
use risk_runner::core::scheduler::{
    CostModel, CostedTest, UniformCost, WeightedCost, schedule, select_cost_model, with_costs,
};
use risk_runner::models::{SpeedMarker, TestId};
use std::collections::HashSet;
use tempfile::tempdir;

fn costed(specs: &[(&str, f64)]) -> Vec<CostedTest> {
    specs
        .iter()
        .map(|(id, cost)| CostedTest {
            test: TestId::from(*id),
            cost: *cost,
        })
        .collect()
}

#[test]
fn test_uniform_45_tests_make_20_20_5() {
    let tests = common::test_ids(45);
    let batches = schedule(with_costs(&tests, &UniformCost), 20);

    let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
    assert_eq!(sizes, vec![20, 20, 5]);
    let indices: Vec<usize> = batches.iter().map(|b| b.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[test]
fn test_uniform_ties_keep_input_order() {
    let tests = common::test_ids(5);
    let batches = schedule(with_costs(&tests, &UniformCost), 2);

    assert_eq!(batches[0].tests, vec![tests[0].clone(), tests[1].clone()]);
    assert_eq!(batches[1].tests, vec![tests[2].clone(), tests[3].clone()]);
    assert_eq!(batches[2].tests, vec![tests[4].clone()]);
}

#[test]
fn test_descending_cost_fills_open_batch_before_opening_next() {
    let input = costed(&[("e", 1.0), ("c", 3.0), ("a", 5.0), ("d", 3.0), ("b", 4.0)]);
    let batches = schedule(input, 3);

    // A new batch is only opened once every existing batch holds the target count.
    assert_eq!(batches.len(), 2);
    let ids = |i: usize| batches[i].tests.iter().map(|t| t.as_str().to_string()).collect::<Vec<_>>();
    assert_eq!(ids(0), vec!["a", "b", "c"]);
    assert_eq!(ids(1), vec!["d", "e"]);
    assert!((batches[0].cost - 12.0).abs() < 1e-9);
    assert!((batches[1].cost - 4.0).abs() < 1e-9);
}

#[test]
fn test_empty_input_gives_no_batches() {
    assert!(schedule(Vec::new(), 20).is_empty());
}

#[test]
fn test_zero_target_is_one_test_per_batch() {
    let tests = common::test_ids(3);
    let batches = schedule(with_costs(&tests, &UniformCost), 0);
    assert_eq!(batches.len(), 3);
    assert!(batches.iter().all(|b| b.len() == 1));
}

#[test]
fn test_duplicates_are_scheduled_once() {
    let input = costed(&[("a", 1.0), ("b", 1.0), ("a", 1.0)]);
    let batches = schedule(input, 10);
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 2);
}

#[test]
fn test_weighted_cost_uses_category_and_marker_factors() {
    let model = WeightedCost::new(CategoryRoots::default()).with_markers([
        (TestId::from("tests/unit/test_a.py::test_slow"), SpeedMarker::Slow),
        (TestId::from("tests/integration/test_b.py::test_medium"), SpeedMarker::Medium),
    ]);

    assert_eq!(model.cost(&TestId::from("tests/unit/test_a.py::test_plain")), 1.0);
    assert_eq!(model.cost(&TestId::from("tests/unit/test_a.py::test_slow")), 3.0);
    assert_eq!(model.cost(&TestId::from("tests/behavior/test_c.py::test_x")), 2.0);
    assert_eq!(model.cost(&TestId::from("tests/integration/test_b.py::test_medium")), 1.5 * 1.5);
}

#[test]
fn test_weighted_cost_prefers_recorded_durations() {
    let dir = tempdir().unwrap();
    let mut history = HistoryStore::open(dir.path().join("history.json"), 10).unwrap();
    let test = TestId::from("tests/behavior/test_c.py::test_x");
    let report = {
        use risk_runner::models::{Batch, BatchOutcome, ExecutionResult, RunReport, RunnerReport};
        use std::time::Duration;
        let batch = Batch {
            index: 0,
            tests: vec![test.clone()],
            cost: 1.0,
        };
        let outcome = BatchOutcome::Completed(RunnerReport {
            passed: vec![test.clone()],
            exit_code: Some(0),
            ..RunnerReport::default()
        });
        RunReport::aggregate(vec![ExecutionResult::from_outcome(
            &batch,
            outcome,
            Duration::from_millis(4500),
            Duration::from_secs(30),
            1,
        )])
    };
    history.record_report(&report, None).unwrap();

    let model = WeightedCost::new(CategoryRoots::default()).with_history(&history);
    assert!((model.cost(&test) - 4.5).abs() < 1e-6);
}

#[test]
fn test_select_cost_model_basic_never_builds_weighted() {
    let model = select_cost_model(CostMode::Basic, || panic!("weighted model must not be built"));
    assert_eq!(model.cost(&TestId::from("tests/behavior/test_c.py::test_x")), 1.0);

    let model = select_cost_model(CostMode::Enhanced, || WeightedCost::new(CategoryRoots::default()));
    assert_eq!(model.cost(&TestId::from("tests/behavior/test_c.py::test_x")), 2.0);
}

proptest! {
    #[test]
    fn prop_batches_cover_input_exactly_once(
        costs in prop::collection::vec(0.0f64..100.0, 0..120),
        target in 0usize..30,
    ) {
        let input: Vec<CostedTest> = costs
            .iter()
            .enumerate()
            .map(|(i, cost)| CostedTest { test: TestId::new(format!("t{i}")), cost: *cost })
            .collect();
        let expected: HashSet<TestId> = input.iter().map(|c| c.test.clone()).collect();

        let batches = schedule(input, target);
        let mut seen = HashSet::new();
        for (i, batch) in batches.iter().enumerate() {
            prop_assert_eq!(batch.index, i);
            prop_assert!(!batch.is_empty());
            prop_assert!(batch.len() <= target.max(1));
            for test in &batch.tests {
                prop_assert!(seen.insert(test.clone()), "duplicate {}", test);
            }
        }
        prop_assert_eq!(seen, expected);
    }
}
